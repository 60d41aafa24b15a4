//! In-memory rowset service for tests.
//!
//! Tables are plain row vectors per object type. Filters, sort order, top
//! and column projection are applied on open; Dynamic cursors re-read the
//! table on every fetch, frozen and snapshot cursors keep the rows they
//! were opened with.

use crate::service::{
    fault_codes, DataResponse, OpenRequest, OpenResponse, RemoteFault, RemoteRowsetService,
};
use hpcview_core::row::{PropertyRow, StoreProperty};
use hpcview_core::value::ObjectType;
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering as AtomicOrdering};

/// Per-method call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub open: usize,
    pub get_data: usize,
    pub freeze: usize,
    pub touch: usize,
    pub close: usize,
}

#[derive(Debug, Default)]
struct Counters {
    open: AtomicUsize,
    get_data: AtomicUsize,
    freeze: AtomicUsize,
    touch: AtomicUsize,
    close: AtomicUsize,
}

#[derive(Debug, Default)]
struct FaultPlan {
    stale_get_data: usize,
    denied: HashSet<ObjectType>,
    fail_close: bool,
}

#[derive(Debug, Clone)]
struct Cursor {
    request: OpenRequest,
    /// Rows captured at open or freeze; `None` re-reads the table.
    rows: Option<Vec<PropertyRow>>,
}

#[derive(Debug)]
pub struct MockRowsetService {
    tables: RwLock<HashMap<ObjectType, Vec<PropertyRow>>>,
    cursors: Mutex<HashMap<i32, Cursor>>,
    next_id: AtomicI32,
    faults: Mutex<FaultPlan>,
    counters: Counters,
    requests: Mutex<Vec<OpenRequest>>,
}

impl Default for MockRowsetService {
    fn default() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            cursors: Mutex::new(HashMap::new()),
            next_id: AtomicI32::new(100),
            faults: Mutex::new(FaultPlan::default()),
            counters: Counters::default(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockRowsetService {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== table setup =====

    pub fn set_rows(&self, object_type: ObjectType, rows: Vec<PropertyRow>) {
        self.tables.write().insert(object_type, rows);
    }

    pub fn push_row(&self, object_type: ObjectType, row: PropertyRow) {
        self.tables.write().entry(object_type).or_default().push(row);
    }

    /// Remove rows matching `pred`; returns how many were removed.
    pub fn remove_rows(&self, object_type: ObjectType, pred: impl Fn(&PropertyRow) -> bool) -> usize {
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(&object_type) else {
            return 0;
        };
        let before = rows.len();
        rows.retain(|r| !pred(r));
        before - rows.len()
    }

    pub fn row_count(&self, object_type: ObjectType) -> usize {
        self.tables.read().get(&object_type).map_or(0, Vec::len)
    }

    // ===== fault injection =====

    /// The next `count` data fetches fail with the stale-rowset fault.
    pub fn fail_next_get_data_stale(&self, count: usize) {
        self.faults.lock().stale_get_data = count;
    }

    pub fn deny(&self, object_type: ObjectType) {
        self.faults.lock().denied.insert(object_type);
    }

    pub fn fail_close(&self, fail: bool) {
        self.faults.lock().fail_close = fail;
    }

    /// Forget a cursor as if the server had timed it out.
    pub fn expire(&self, rowset_id: i32) -> bool {
        self.cursors.lock().remove(&rowset_id).is_some()
    }

    // ===== inspection =====

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            open: self.counters.open.load(AtomicOrdering::SeqCst),
            get_data: self.counters.get_data.load(AtomicOrdering::SeqCst),
            freeze: self.counters.freeze.load(AtomicOrdering::SeqCst),
            touch: self.counters.touch.load(AtomicOrdering::SeqCst),
            close: self.counters.close.load(AtomicOrdering::SeqCst),
        }
    }

    pub fn open_cursors(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.cursors.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn last_request(&self) -> Option<OpenRequest> {
        self.requests.lock().last().cloned()
    }

    pub fn requests(&self) -> Vec<OpenRequest> {
        self.requests.lock().clone()
    }

    fn evaluate(&self, request: &OpenRequest) -> Vec<PropertyRow> {
        let tables = self.tables.read();
        let mut rows: Vec<&PropertyRow> = tables
            .get(&request.object_type)
            .map(|rows| {
                rows.iter()
                    .filter(|row| request.filter.iter().all(|f| f.matches_row(row)))
                    .collect()
            })
            .unwrap_or_default();

        rows.sort_by(|a, b| {
            request
                .sort
                .iter()
                .map(|s| s.compare_rows(a, b))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        if let Some(top) = request.top {
            rows.truncate(usize::try_from(top).unwrap_or(0));
        }

        rows.into_iter()
            .map(|row| {
                if request.columns.is_empty() {
                    return row.clone();
                }
                PropertyRow::indexed(
                    request
                        .columns
                        .iter()
                        .map(|c| row.get(c).cloned().unwrap_or_else(|| StoreProperty::null(c.clone())))
                        .collect(),
                )
            })
            .collect()
    }

    fn cursor_rows(&self, rowset_id: i32) -> Result<Vec<PropertyRow>, RemoteFault> {
        let cursor = self
            .cursors
            .lock()
            .get(&rowset_id)
            .cloned()
            .ok_or_else(|| RemoteFault::stale(rowset_id))?;
        Ok(match cursor.rows {
            Some(rows) => rows,
            None => self.evaluate(&cursor.request),
        })
    }

    fn allocate_id(&self) -> i32 {
        self.next_id.fetch_add(1, AtomicOrdering::SeqCst)
    }
}

impl RemoteRowsetService for MockRowsetService {
    fn open(&self, request: &OpenRequest) -> Result<OpenResponse, RemoteFault> {
        self.counters.open.fetch_add(1, AtomicOrdering::SeqCst);
        self.requests.lock().push(request.clone());
        if self.faults.lock().denied.contains(&request.object_type) {
            return Err(RemoteFault::access_denied(request.object_type));
        }
        let rows = self.evaluate(request);
        let total = rows.len() as i32;
        let id = self.allocate_id();
        let captured = (!request.rowset_type.is_dynamic()).then_some(rows);
        self.cursors.lock().insert(
            id,
            Cursor {
                request: request.clone(),
                rows: captured,
            },
        );
        Ok(OpenResponse {
            rowset_id: id,
            total_row_count: total,
        })
    }

    fn get_data(
        &self,
        rowset_id: i32,
        first_row: i32,
        last_row: i32,
        _define_boundary: bool,
    ) -> Result<DataResponse, RemoteFault> {
        self.counters.get_data.fetch_add(1, AtomicOrdering::SeqCst);
        {
            let mut faults = self.faults.lock();
            if faults.stale_get_data > 0 {
                faults.stale_get_data -= 1;
                return Err(RemoteFault::stale(rowset_id));
            }
        }
        if first_row < 0 || last_row < first_row {
            return Err(RemoteFault::new(
                fault_codes::GENERIC,
                format!("bad range {}..{}", first_row, last_row),
            ));
        }
        let rows = self.cursor_rows(rowset_id)?;
        let total = rows.len() as i32;
        let start = (first_row as usize).min(rows.len());
        let end = ((last_row as usize).saturating_add(1)).min(rows.len());
        Ok(DataResponse {
            rows: rows[start..end].to_vec(),
            total_row_count: total,
        })
    }

    fn freeze(&self, rowset_id: i32) -> Result<i32, RemoteFault> {
        self.counters.freeze.fetch_add(1, AtomicOrdering::SeqCst);
        let rows = self.cursor_rows(rowset_id)?;
        let request = self
            .cursors
            .lock()
            .get(&rowset_id)
            .map(|c| c.request.clone())
            .ok_or_else(|| RemoteFault::stale(rowset_id))?;
        let id = self.allocate_id();
        self.cursors.lock().insert(
            id,
            Cursor {
                request,
                rows: Some(rows),
            },
        );
        Ok(id)
    }

    fn touch(&self, rowset_id: i32) -> Result<(), RemoteFault> {
        self.counters.touch.fetch_add(1, AtomicOrdering::SeqCst);
        if self.cursors.lock().contains_key(&rowset_id) {
            Ok(())
        } else {
            Err(RemoteFault::stale(rowset_id))
        }
    }

    fn close(&self, rowset_id: i32) -> Result<(), RemoteFault> {
        self.counters.close.fetch_add(1, AtomicOrdering::SeqCst);
        let removed = self.cursors.lock().remove(&rowset_id).is_some();
        if self.faults.lock().fail_close {
            return Err(RemoteFault::new(fault_codes::GENERIC, "connection reset"));
        }
        if removed {
            Ok(())
        } else {
            Err(RemoteFault::stale(rowset_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpcview_core::filter::{FilterProperty, SortProperty};
    use hpcview_core::query::RowSetType;
    use hpcview_core::well_known;

    fn job(id: i32, owner: &str) -> PropertyRow {
        PropertyRow::indexed(vec![
            StoreProperty::new(well_known::JOB_ID.clone(), Some(id.into())).unwrap(),
            StoreProperty::new(well_known::JOB_OWNER.clone(), Some(owner.into())).unwrap(),
        ])
    }

    #[test]
    fn test_open_applies_filter_sort_top() {
        let service = MockRowsetService::new();
        service.set_rows(
            ObjectType::Job,
            vec![job(3, "alice"), job(1, "alice"), job(2, "bob"), job(4, "alice")],
        );
        let mut request = OpenRequest::new(ObjectType::Job, RowSetType::Snapshot);
        request.columns = vec![well_known::JOB_ID.clone()];
        request.filter = vec![FilterProperty::equal(well_known::JOB_OWNER.clone(), "alice")];
        request.sort = vec![SortProperty::descending(well_known::JOB_ID.clone())];
        request.top = Some(2);

        let opened = service.open(&request).unwrap();
        assert_eq!(opened.total_row_count, 2);
        let data = service.get_data(opened.rowset_id, 0, 10, false).unwrap();
        let ids: Vec<i32> = data
            .rows
            .iter()
            .filter_map(|r| r.value(&well_known::JOB_ID).and_then(|v| v.as_i32()))
            .collect();
        assert_eq!(ids, vec![4, 3]);
        assert_eq!(data.rows[0].len(), 1);
    }

    #[test]
    fn test_stale_injection_and_close() {
        let service = MockRowsetService::new();
        let opened = service
            .open(&OpenRequest::new(ObjectType::Node, RowSetType::Dynamic))
            .unwrap();
        service.fail_next_get_data_stale(1);
        assert!(service.get_data(opened.rowset_id, 0, 0, false).unwrap_err().is_stale());
        assert!(service.get_data(opened.rowset_id, 0, 0, false).is_ok());
        service.close(opened.rowset_id).unwrap();
        assert!(service.open_cursors().is_empty());
        assert_eq!(service.calls().close, 1);
    }
}
