//! Local rowset: query builder and object materialization over a
//! [`RemoteRowset`], serialized by one reader/writer lock.
//!
//! Lock paths:
//! - structural mutators, `pause`, `resume`, `close`: exclusive
//! - `get_count`, `get_object_index`: shared
//! - `seek`, `get_rows`, `get_data`: upgradable, since a fetch may have to
//!   reopen the cursor

use crate::dispatch::{ChangeHandler, HandlerId, RowsetChangeEvent, RowsetRegistry, RowsetSink};
use crate::entity::EntityConfig;
use crate::protocol::{RemoteRowset, RowsetState};
use crate::service::RemoteRowsetService;
use hpcview_compat::PropertyCompatibility;
use hpcview_core::error::{HpcViewResult, RowsetError};
use hpcview_core::filter::{FilterProperty, SortProperty};
use hpcview_core::property::PropertyId;
use hpcview_core::query::{AggregateColumn, RowSetType, SeekOrigin};
use hpcview_core::row::{PropertyRow, StoreProperty};
use hpcview_core::value::{ObjectType, PropertyValue};
use parking_lot::{RwLock, RwLockUpgradableReadGuard, RwLockWriteGuard};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Collaborators shared by every rowset of one connection.
#[derive(Clone)]
pub struct RowsetContext {
    pub service: Arc<dyn RemoteRowsetService>,
    pub compat: Arc<PropertyCompatibility>,
    pub registry: Arc<RowsetRegistry>,
    pub page_size: usize,
}

impl RowsetContext {
    pub fn new(
        service: Arc<dyn RemoteRowsetService>,
        compat: Arc<PropertyCompatibility>,
        registry: Arc<RowsetRegistry>,
    ) -> Self {
        Self {
            service,
            compat,
            registry,
            page_size: 128,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

impl fmt::Debug for RowsetContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowsetContext")
            .field("version", &self.compat.version())
            .field("registered", &self.registry.len())
            .field("page_size", &self.page_size)
            .finish()
    }
}

// ============================================================================
// COLUMN SHAPE
// ============================================================================

/// Requested columns versus columns sent to the server.
#[derive(Debug, Clone, Default)]
struct ColumnShape {
    requested: Vec<PropertyId>,
    object_requested: bool,
    /// Id columns fetched only to build the object handle.
    added: Vec<PropertyId>,
}

impl ColumnShape {
    /// Returns the shape and the server column list.
    fn build(entity: &EntityConfig, columns: Vec<PropertyId>) -> (Self, Vec<PropertyId>) {
        let object_requested = columns.contains(&entity.object_property);
        let mut server: Vec<PropertyId> = columns
            .iter()
            .filter(|c| **c != entity.object_property)
            .cloned()
            .collect();
        let mut added = Vec::new();
        if object_requested {
            let ids = std::iter::once(&entity.id_property).chain(entity.parent_id_property.as_ref());
            for id in ids {
                if !server.contains(id) {
                    server.push(id.clone());
                    added.push(id.clone());
                }
            }
        }
        let shape = Self {
            requested: columns,
            object_requested,
            added,
        };
        (shape, server)
    }

    /// Requested columns in order, the object column replaced by a handle,
    /// followed by the id columns added for it.
    fn project(&self, entity: &EntityConfig, row: PropertyRow) -> PropertyRow {
        if !self.object_requested {
            return row;
        }
        let id = row.value(&entity.id_property).and_then(PropertyValue::as_i32);
        let parent = entity
            .parent_id_property
            .as_ref()
            .and_then(|p| row.value(p))
            .and_then(PropertyValue::as_i32);
        let object = id.map(|id| PropertyValue::Object((entity.materialize)(id, parent)));

        let mut out = Vec::with_capacity(self.requested.len() + self.added.len());
        for column in self.requested.iter().chain(self.added.iter()) {
            if *column == entity.object_property {
                out.push(StoreProperty {
                    id: column.clone(),
                    value: object.clone(),
                });
            } else if let Some(prop) = row.get(column) {
                out.push(prop.clone());
            }
        }
        PropertyRow::indexed(out)
    }
}

struct Inner {
    remote: RemoteRowset,
    shape: ColumnShape,
}

// ============================================================================
// LOCAL ROWSET
// ============================================================================

pub struct LocalRowset {
    entity: EntityConfig,
    sink: Arc<RowsetSink>,
    page_size: usize,
    inner: RwLock<Inner>,
}

impl fmt::Debug for LocalRowset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalRowset")
            .field("object_type", &self.entity.object_type)
            .field("sink", &self.sink)
            .finish()
    }
}

impl LocalRowset {
    pub fn new(entity: EntityConfig, rowset_type: RowSetType, ctx: &RowsetContext) -> Self {
        let remote = RemoteRowset::new(
            entity.object_type,
            rowset_type,
            Arc::clone(&ctx.service),
            Arc::clone(&ctx.compat),
        )
        .with_registry(Arc::clone(&ctx.registry))
        .with_base_filter(entity.base_filter.clone())
        .with_options(entity.options);
        let sink = Arc::clone(remote.sink());
        Self {
            entity,
            sink,
            page_size: ctx.page_size.max(1),
            inner: RwLock::new(Inner {
                remote,
                shape: ColumnShape::default(),
            }),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.entity.object_type
    }

    pub fn entity(&self) -> &EntityConfig {
        &self.entity
    }

    pub fn global_id(&self) -> i32 {
        self.inner.read().remote.global_id()
    }

    pub fn state(&self) -> RowsetState {
        self.inner.read().remote.state()
    }

    pub fn rowset_type(&self) -> RowSetType {
        self.inner.read().remote.rowset_type()
    }

    /// Columns as requested, in order.
    pub fn columns(&self) -> Vec<PropertyId> {
        self.inner.read().shape.requested.clone()
    }

    /// Columns of returned rows, including id columns added for the object
    /// column.
    pub fn row_columns(&self) -> Vec<PropertyId> {
        let inner = self.inner.read();
        if inner.shape.object_requested {
            inner
                .shape
                .requested
                .iter()
                .chain(inner.shape.added.iter())
                .cloned()
                .collect()
        } else {
            inner.remote.conversion().client_columns().cloned().collect()
        }
    }

    // ===== writer path =====

    pub fn set_columns(&self, columns: Vec<PropertyId>) -> Result<(), RowsetError> {
        let mut inner = self.inner.write();
        let (shape, server) = ColumnShape::build(&self.entity, columns);
        inner.remote.set_columns(server)?;
        inner.shape = shape;
        Ok(())
    }

    /// Replace user filters; the entity's base filter always applies.
    pub fn set_filter(&self, filter: Vec<FilterProperty>) -> Result<(), RowsetError> {
        self.inner.write().remote.set_filter(filter)
    }

    pub fn set_sort_order(&self, sort: Vec<SortProperty>) -> Result<(), RowsetError> {
        self.inner.write().remote.set_sort_order(sort)
    }

    pub fn set_aggregate_columns(&self, aggregate: Vec<AggregateColumn>) -> Result<(), RowsetError> {
        self.inner.write().remote.set_aggregate_columns(aggregate)
    }

    pub fn set_group_by(&self, group_by: Vec<PropertyId>) -> Result<(), RowsetError> {
        self.inner.write().remote.set_group_by(group_by)
    }

    pub fn set_top(&self, top: Option<i32>) -> Result<(), RowsetError> {
        self.inner.write().remote.set_top(top)
    }

    pub fn set_frozen_columns(&self, columns: Vec<PropertyId>) -> Result<(), RowsetError> {
        self.inner.write().remote.set_frozen_columns(columns)
    }

    pub fn set_rowset_type(&self, rowset_type: RowSetType) -> Result<(), RowsetError> {
        self.inner.write().remote.set_rowset_type(rowset_type)
    }

    /// Force a reopen on next access.
    pub fn invalidate(&self) -> Result<(), RowsetError> {
        let mut inner = self.inner.write();
        if inner.remote.state() == RowsetState::Frozen {
            return Err(RowsetError::Frozen);
        }
        inner.remote.invalidate();
        Ok(())
    }

    pub fn pause(&self) -> HpcViewResult<()> {
        self.inner.write().remote.pause()
    }

    pub fn resume(&self) -> Result<(), RowsetError> {
        self.inner.write().remote.resume()
    }

    /// Close the server cursor and leave the dispatch table. Failures are
    /// swallowed; a later access reopens.
    pub fn close(&self) {
        self.inner.write().remote.close();
    }

    // ===== reader path =====

    pub fn get_count(&self) -> HpcViewResult<i32> {
        {
            let inner = self.inner.read();
            if inner.remote.is_open() {
                return Ok(inner.remote.row_count());
            }
        }
        let mut inner = self.inner.write();
        inner.remote.ensure_open()?;
        Ok(inner.remote.row_count())
    }

    /// Row index of an object seen in a fetched page or a pushed change.
    pub fn get_object_index(&self, object_id: i32) -> Option<i32> {
        let _inner = self.inner.read();
        self.sink.object_index(object_id)
    }

    pub fn position(&self) -> i32 {
        self.sink.position()
    }

    pub fn touch(&self) -> Result<(), RowsetError> {
        self.inner.read().remote.touch()
    }

    // ===== upgradable path =====

    pub fn seek(&self, origin: SeekOrigin, offset: i32) -> HpcViewResult<i32> {
        let inner = self.open_upgradable()?;
        let position = crate::protocol::seek_position(
            origin,
            offset,
            inner.remote.position(),
            inner.remote.row_count(),
        );
        self.sink.set_position(position);
        Ok(position)
    }

    /// Next `count` rows from the current position; advances the position.
    pub fn get_rows(&self, count: usize) -> HpcViewResult<Vec<PropertyRow>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let inner = self.open_upgradable()?;
        let start = inner.remote.position();
        if start >= inner.remote.row_count() {
            return Ok(Vec::new());
        }
        let last = start.saturating_add(i32::try_from(count).unwrap_or(i32::MAX) - 1);
        let rows = self.fetch(inner, start, last, false)?;
        self.sink.set_position(start + rows.len() as i32);
        Ok(rows)
    }

    /// Rows `first_row..=last_row`; a range past the end returns the rows
    /// that remain.
    pub fn get_data(
        &self,
        first_row: i32,
        last_row: i32,
        define_boundary: bool,
    ) -> HpcViewResult<Vec<PropertyRow>> {
        let inner = self.inner.upgradable_read();
        self.fetch(inner, first_row, last_row, define_boundary)
    }

    /// Page through the rowset from row 0.
    pub fn rows(&self, page_size: usize) -> Rows<'_> {
        Rows {
            rowset: self,
            page_size: page_size.max(1),
            next_row: 0,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Page through the rowset with the connection's page size.
    pub fn iter(&self) -> Rows<'_> {
        self.rows(self.page_size)
    }

    fn open_upgradable(&self) -> HpcViewResult<RwLockUpgradableReadGuard<'_, Inner>> {
        let inner = self.inner.upgradable_read();
        if inner.remote.is_open() {
            return Ok(inner);
        }
        let mut inner = RwLockUpgradableReadGuard::upgrade(inner);
        inner.remote.ensure_open()?;
        Ok(RwLockWriteGuard::downgrade_to_upgradable(inner))
    }

    fn fetch(
        &self,
        inner: RwLockUpgradableReadGuard<'_, Inner>,
        first_row: i32,
        last_row: i32,
        define_boundary: bool,
    ) -> HpcViewResult<Vec<PropertyRow>> {
        if inner.remote.is_open() {
            return match inner.remote.read_rows(first_row, last_row, define_boundary) {
                Ok(rows) => Ok(self.materialize(&inner, first_row, rows)),
                Err(err) if inner.remote.can_recover(&err) => {
                    let mut inner = RwLockUpgradableReadGuard::upgrade(inner);
                    let rows = inner
                        .remote
                        .retry_after_stale(first_row, last_row, define_boundary)?;
                    Ok(self.materialize(&inner, first_row, rows))
                }
                Err(err) => Err(err),
            };
        }
        let mut inner = RwLockUpgradableReadGuard::upgrade(inner);
        let rows = inner.remote.get_data(first_row, last_row, define_boundary)?;
        Ok(self.materialize(&inner, first_row, rows))
    }

    fn materialize(&self, inner: &Inner, first_row: i32, rows: Vec<PropertyRow>) -> Vec<PropertyRow> {
        self.sink.record_page(
            first_row,
            rows.iter()
                .map(|row| row.value(&self.entity.id_property).and_then(PropertyValue::as_i32)),
        );
        rows.into_iter()
            .map(|row| inner.shape.project(&self.entity, row))
            .collect()
    }

    // ===== change handlers =====

    pub fn subscribe<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&RowsetChangeEvent) + Send + Sync + 'static,
    {
        self.sink.subscribe(handler)
    }

    pub fn subscribe_handler(&self, handler: ChangeHandler) -> HandlerId {
        self.sink.subscribe(move |event| handler(event))
    }

    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        self.sink.unsubscribe(id)
    }
}

impl Drop for LocalRowset {
    fn drop(&mut self) {
        self.inner.get_mut().remote.close();
    }
}

// ============================================================================
// ITERATION
// ============================================================================

/// Paged iterator returned by [`LocalRowset::rows`]. Stops after an empty
/// or short page, or after the first error.
pub struct Rows<'a> {
    rowset: &'a LocalRowset,
    page_size: usize,
    next_row: i32,
    buffer: VecDeque<PropertyRow>,
    done: bool,
}

impl Iterator for Rows<'_> {
    type Item = HpcViewResult<PropertyRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.buffer.pop_front() {
            return Some(Ok(row));
        }
        if self.done {
            return None;
        }
        let page = i32::try_from(self.page_size).unwrap_or(i32::MAX);
        let last = self.next_row.saturating_add(page - 1);
        match self.rowset.get_data(self.next_row, last, false) {
            Ok(rows) => {
                if rows.len() < self.page_size {
                    self.done = true;
                }
                self.next_row = self.next_row.saturating_add(rows.len() as i32);
                self.buffer.extend(rows);
                self.buffer.pop_front().map(Ok)
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
