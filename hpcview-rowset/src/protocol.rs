//! Remote rowset protocol client.
//!
//! Owns one server-side cursor. The cursor is opened lazily on first data
//! access, forced closed by any structural mutation, and reopened on the
//! next access. Data fetches that hit a stale cursor reopen and retry once.
//!
//! A paused (Frozen) rowset is read-only until [`RemoteRowset::resume`]:
//! structural mutators fail with [`RowsetError::Frozen`] and leave the
//! snapshot in place rather than closing it. The only ways out of Frozen
//! are `resume` and `close`, both of which end in Closed.

use crate::dispatch::{RowsetRegistry, RowsetSink};
use crate::service::{OpenRequest, RemoteFault, RemoteRowsetService};
use hpcview_compat::{ConversionMap, PropertyCompatibility};
use hpcview_core::error::{HpcViewResult, RowsetError};
use hpcview_core::filter::{FilterProperty, SortProperty};
use hpcview_core::property::PropertyId;
use hpcview_core::query::{AggregateColumn, RowSetType, RowsetOptions, SeekOrigin};
use hpcview_core::row::PropertyRow;
use hpcview_core::value::ObjectType;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Id of a rowset that has no server cursor.
pub const UNOPENED: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowsetState {
    /// No server cursor.
    Closed,
    /// Live or snapshot cursor with a cached row count.
    Open,
    /// Dynamic rowset detached into a read-only snapshot.
    Frozen,
}

impl fmt::Display for RowsetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RowsetState::Closed => "closed",
            RowsetState::Open => "open",
            RowsetState::Frozen => "frozen",
        };
        f.write_str(s)
    }
}

/// Query shape plus cursor bookkeeping for one rowset.
pub struct RemoteRowset {
    object_type: ObjectType,
    rowset_type: RowSetType,
    options: RowsetOptions,
    service: Arc<dyn RemoteRowsetService>,
    compat: Arc<PropertyCompatibility>,
    registry: Option<Arc<RowsetRegistry>>,
    sink: Arc<RowsetSink>,

    global_id: i32,
    state: RowsetState,

    columns: Vec<PropertyId>,
    conversion: Arc<ConversionMap>,
    /// Client column unique id -> position in returned rows.
    column_index: HashMap<i32, usize>,
    base_filter: Vec<FilterProperty>,
    filter: Vec<FilterProperty>,
    sort: Vec<SortProperty>,
    aggregate: Vec<AggregateColumn>,
    group_by: Vec<PropertyId>,
    frozen_columns: Vec<PropertyId>,
    top: Option<i32>,
}

impl fmt::Debug for RemoteRowset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteRowset")
            .field("object_type", &self.object_type)
            .field("rowset_type", &self.rowset_type)
            .field("global_id", &self.global_id)
            .field("state", &self.state)
            .field("columns", &self.columns.len())
            .finish()
    }
}

impl RemoteRowset {
    pub fn new(
        object_type: ObjectType,
        rowset_type: RowSetType,
        service: Arc<dyn RemoteRowsetService>,
        compat: Arc<PropertyCompatibility>,
    ) -> Self {
        Self {
            object_type,
            rowset_type,
            options: RowsetOptions::empty(),
            service,
            compat,
            registry: None,
            sink: Arc::new(RowsetSink::new(object_type)),
            global_id: UNOPENED,
            state: RowsetState::Closed,
            columns: Vec::new(),
            conversion: Arc::new(ConversionMap::default()),
            column_index: HashMap::new(),
            base_filter: Vec::new(),
            filter: Vec::new(),
            sort: Vec::new(),
            aggregate: Vec::new(),
            group_by: Vec::new(),
            frozen_columns: Vec::new(),
            top: None,
        }
    }

    /// Dispatch table that Dynamic cursors register with while open.
    pub fn with_registry(mut self, registry: Arc<RowsetRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Filters that stay in front of every user filter.
    pub fn with_base_filter(mut self, base: Vec<FilterProperty>) -> Self {
        self.base_filter = base;
        self
    }

    pub fn with_options(mut self, options: RowsetOptions) -> Self {
        self.options = options;
        self
    }

    // ===== accessors =====

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn rowset_type(&self) -> RowSetType {
        self.rowset_type
    }

    pub fn options(&self) -> RowsetOptions {
        self.options
    }

    pub fn global_id(&self) -> i32 {
        self.global_id
    }

    pub fn state(&self) -> RowsetState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state != RowsetState::Closed
    }

    pub fn sink(&self) -> &Arc<RowsetSink> {
        &self.sink
    }

    pub fn columns(&self) -> &[PropertyId] {
        &self.columns
    }

    pub fn conversion(&self) -> &ConversionMap {
        &self.conversion
    }

    pub fn filter(&self) -> &[FilterProperty] {
        &self.filter
    }

    pub fn base_filter(&self) -> &[FilterProperty] {
        &self.base_filter
    }

    pub fn sort(&self) -> &[SortProperty] {
        &self.sort
    }

    pub fn top(&self) -> Option<i32> {
        self.top
    }

    /// Position of a client column in returned rows.
    pub fn column_index(&self, id: &PropertyId) -> Option<usize> {
        self.column_index.get(&id.unique_id()).copied()
    }

    /// Cached row count; refreshed by every open, fetch and pushed change.
    pub fn row_count(&self) -> i32 {
        self.sink.row_count()
    }

    pub fn position(&self) -> i32 {
        self.sink.position()
    }

    // ===== structural mutators =====

    pub fn set_columns(&mut self, columns: Vec<PropertyId>) -> Result<(), RowsetError> {
        self.ensure_mutable()?;
        let conversion = Arc::new(self.compat.expand_columns(&columns));
        self.column_index = conversion
            .client_columns()
            .enumerate()
            .map(|(pos, id)| (id.unique_id(), pos))
            .collect();
        self.sink.set_conversion(Some(Arc::clone(&conversion)));
        self.conversion = conversion;
        self.columns = columns;
        self.invalidate();
        Ok(())
    }

    /// Replace the user filters. Base filters are kept.
    pub fn set_filter(&mut self, filter: Vec<FilterProperty>) -> Result<(), RowsetError> {
        self.ensure_mutable()?;
        self.filter = filter;
        self.invalidate();
        Ok(())
    }

    pub fn set_sort_order(&mut self, sort: Vec<SortProperty>) -> Result<(), RowsetError> {
        self.ensure_mutable()?;
        self.sort = sort;
        self.invalidate();
        Ok(())
    }

    pub fn set_aggregate_columns(
        &mut self,
        aggregate: Vec<AggregateColumn>,
    ) -> Result<(), RowsetError> {
        self.ensure_mutable()?;
        self.aggregate = aggregate;
        self.invalidate();
        Ok(())
    }

    pub fn set_group_by(&mut self, group_by: Vec<PropertyId>) -> Result<(), RowsetError> {
        self.ensure_mutable()?;
        self.group_by = group_by;
        self.invalidate();
        Ok(())
    }

    pub fn set_frozen_columns(&mut self, columns: Vec<PropertyId>) -> Result<(), RowsetError> {
        self.ensure_mutable()?;
        self.frozen_columns = columns;
        self.invalidate();
        Ok(())
    }

    pub fn set_top(&mut self, top: Option<i32>) -> Result<(), RowsetError> {
        self.ensure_mutable()?;
        self.top = top;
        self.invalidate();
        Ok(())
    }

    pub fn set_rowset_type(&mut self, rowset_type: RowSetType) -> Result<(), RowsetError> {
        self.ensure_mutable()?;
        self.rowset_type = rowset_type;
        self.invalidate();
        Ok(())
    }

    pub fn set_options(&mut self, options: RowsetOptions) -> Result<(), RowsetError> {
        self.ensure_mutable()?;
        self.options = options;
        self.invalidate();
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<(), RowsetError> {
        if self.state == RowsetState::Frozen {
            return Err(RowsetError::Frozen);
        }
        Ok(())
    }

    /// Drop the server cursor; the next data access reopens it.
    pub fn invalidate(&mut self) {
        if self.state == RowsetState::Open {
            self.release_cursor();
        }
        self.global_id = UNOPENED;
        self.state = RowsetState::Closed;
        self.sink.set_rowset_id(UNOPENED);
    }

    // ===== cursor lifecycle =====

    pub fn ensure_open(&mut self) -> HpcViewResult<()> {
        if self.state == RowsetState::Closed {
            self.open()?;
        }
        Ok(())
    }

    fn build_request(&self) -> HpcViewResult<OpenRequest> {
        let mut filter = Vec::with_capacity(self.base_filter.len() + self.filter.len());
        filter.extend(self.base_filter.iter().cloned());
        filter.extend(self.filter.iter().cloned());

        let mut request = OpenRequest::new(self.object_type, self.rowset_type);
        request.options = self.options;
        request.columns = self.conversion.server_columns().to_vec();
        request.filter = self.compat.expand_filters(&filter)?;
        request.sort = self.compat.expand_sorts(&self.sort)?;
        request.aggregate = self.aggregate.clone();
        request.group_by = self.group_by.clone();
        request.frozen_columns = self
            .compat
            .expand_columns(&self.frozen_columns)
            .server_columns()
            .to_vec();
        request.top = self.top;
        Ok(request)
    }

    fn open(&mut self) -> HpcViewResult<()> {
        let request = self.build_request()?;
        let response = self
            .service
            .open(&request)
            .map_err(|fault| fault.into_rowset_error(self.object_type, UNOPENED))?;

        self.global_id = response.rowset_id;
        self.state = RowsetState::Open;
        self.sink.set_rowset_id(response.rowset_id);
        self.sink.set_row_count(response.total_row_count);
        self.sink.set_position(0);
        self.sink.clear_index();
        if self.rowset_type.is_dynamic() {
            if let Some(registry) = &self.registry {
                registry.register(response.rowset_id, Arc::clone(&self.sink));
            }
        }
        debug!(
            rowset_id = response.rowset_id,
            object_type = %self.object_type,
            rows = response.total_row_count,
            dynamic = self.rowset_type.is_dynamic(),
            "rowset opened"
        );
        Ok(())
    }

    /// Best-effort release of the current cursor. Failures are logged only.
    fn release_cursor(&mut self) {
        if self.global_id == UNOPENED {
            return;
        }
        if let Some(registry) = &self.registry {
            registry.unregister(self.global_id);
        }
        if let Err(fault) = self.service.close(self.global_id) {
            debug!(rowset_id = self.global_id, %fault, "ignoring close failure");
        }
    }

    fn fault(&self, fault: RemoteFault) -> RowsetError {
        fault.into_rowset_error(self.object_type, self.global_id)
    }

    // ===== data access =====

    /// Fetch rows `first_row..=last_row`, opening the cursor if needed.
    ///
    /// A stale cursor is reopened and the fetch retried exactly once.
    pub fn get_data(
        &mut self,
        first_row: i32,
        last_row: i32,
        define_boundary: bool,
    ) -> HpcViewResult<Vec<PropertyRow>> {
        check_range(first_row, last_row)?;
        self.ensure_open()?;
        match self.read_rows(first_row, last_row, define_boundary) {
            Err(err) if self.can_recover(&err) => {
                self.retry_after_stale(first_row, last_row, define_boundary)
            }
            other => other,
        }
    }

    /// Fetch from an already open cursor without touching cursor state.
    pub fn read_rows(
        &self,
        first_row: i32,
        last_row: i32,
        define_boundary: bool,
    ) -> HpcViewResult<Vec<PropertyRow>> {
        check_range(first_row, last_row)?;
        if !self.is_open() {
            return Err(RowsetError::Closed.into());
        }
        if !self.rowset_type.is_dynamic() && self.row_count() == 0 {
            return Ok(Vec::new());
        }
        let response = self
            .service
            .get_data(self.global_id, first_row, last_row, define_boundary)
            .map_err(|fault| self.fault(fault))?;
        self.sink.set_row_count(response.total_row_count);
        let rows: Vec<PropertyRow> = response
            .rows
            .into_iter()
            .map(|row| {
                let mut restored = self.conversion.restore_row(&row, true);
                restored.build_index();
                restored
            })
            .collect();
        Ok(rows)
    }

    /// True for a stale-cursor error on a live cursor. A stale frozen
    /// snapshot cannot be rebuilt and is reported as is.
    pub fn can_recover(&self, err: &hpcview_core::error::HpcViewError) -> bool {
        matches!(
            err,
            hpcview_core::error::HpcViewError::Rowset(RowsetError::StaleRowset { .. })
        ) && self.state == RowsetState::Open
    }

    /// Reopen after a stale-cursor error and fetch once more.
    pub fn retry_after_stale(
        &mut self,
        first_row: i32,
        last_row: i32,
        define_boundary: bool,
    ) -> HpcViewResult<Vec<PropertyRow>> {
        self.recover_stale()?;
        self.read_rows(first_row, last_row, define_boundary)
    }

    fn recover_stale(&mut self) -> HpcViewResult<()> {
        warn!(
            rowset_id = self.global_id,
            object_type = %self.object_type,
            "stale rowset, reopening"
        );
        self.invalidate();
        self.open()
    }

    /// Move the cursor pointer. Opens the cursor to learn the row count;
    /// never fetches data.
    pub fn seek(&mut self, origin: SeekOrigin, offset: i32) -> HpcViewResult<i32> {
        self.ensure_open()?;
        let position = seek_position(origin, offset, self.position(), self.row_count());
        self.sink.set_position(position);
        Ok(position)
    }

    // ===== freeze / resume =====

    /// Detach a Dynamic cursor into a read-only snapshot.
    pub fn pause(&mut self) -> HpcViewResult<()> {
        if !self.rowset_type.is_dynamic() {
            return Err(RowsetError::NotDynamic.into());
        }
        if self.state == RowsetState::Frozen {
            return Err(RowsetError::Frozen.into());
        }
        self.ensure_open()?;
        let live = self.global_id;
        let snapshot = self.service.freeze(live).map_err(|fault| self.fault(fault))?;

        self.release_cursor();
        self.global_id = snapshot;
        self.state = RowsetState::Frozen;
        self.sink.set_rowset_id(snapshot);
        info!(live, snapshot, object_type = %self.object_type, "rowset paused");
        Ok(())
    }

    /// Discard the frozen snapshot; the next access reopens the live cursor.
    pub fn resume(&mut self) -> Result<(), RowsetError> {
        if self.state != RowsetState::Frozen {
            return Err(RowsetError::NotFrozen);
        }
        let snapshot = self.global_id;
        if let Err(fault) = self.service.close(snapshot) {
            debug!(rowset_id = snapshot, %fault, "ignoring snapshot close failure");
        }
        self.global_id = UNOPENED;
        self.state = RowsetState::Closed;
        self.sink.set_rowset_id(UNOPENED);
        info!(snapshot, object_type = %self.object_type, "rowset resumed");
        Ok(())
    }

    /// Keep the server cursor alive. No-op while closed.
    pub fn touch(&self) -> Result<(), RowsetError> {
        if !self.is_open() {
            return Ok(());
        }
        self.service
            .touch(self.global_id)
            .map_err(|fault| self.fault(fault))
    }

    /// Release the server cursor. Never fails.
    pub fn close(&mut self) {
        if self.is_open() {
            debug!(rowset_id = self.global_id, state = %self.state, "closing rowset");
            self.release_cursor();
        }
        self.global_id = UNOPENED;
        self.state = RowsetState::Closed;
        self.sink.set_rowset_id(UNOPENED);
    }
}

fn check_range(first_row: i32, last_row: i32) -> Result<(), RowsetError> {
    if first_row < 0 || last_row < first_row {
        return Err(RowsetError::InvalidRange {
            first: first_row,
            last: last_row,
        });
    }
    Ok(())
}

/// New cursor position, clamped to the rows that exist.
pub fn seek_position(origin: SeekOrigin, offset: i32, current: i32, row_count: i32) -> i32 {
    let last = (row_count - 1).max(0);
    let target = match origin {
        SeekOrigin::Begin => offset,
        SeekOrigin::Current => current.saturating_add(offset),
        SeekOrigin::End => last.saturating_sub(offset),
    };
    target.clamp(0, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_position() {
        assert_eq!(seek_position(SeekOrigin::Begin, 3, 0, 10), 3);
        assert_eq!(seek_position(SeekOrigin::Current, 2, 3, 10), 5);
        assert_eq!(seek_position(SeekOrigin::Current, -9, 3, 10), 0);
        assert_eq!(seek_position(SeekOrigin::End, 0, 0, 10), 9);
        assert_eq!(seek_position(SeekOrigin::End, 2, 0, 10), 7);
        assert_eq!(seek_position(SeekOrigin::Begin, 50, 0, 10), 9);
        assert_eq!(seek_position(SeekOrigin::End, 0, 0, 0), 0);
    }

    #[test]
    fn test_range_check() {
        assert!(check_range(0, 0).is_ok());
        assert_eq!(
            check_range(5, 2),
            Err(RowsetError::InvalidRange { first: 5, last: 2 })
        );
        assert!(check_range(-1, 2).is_err());
    }
}
