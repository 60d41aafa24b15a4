//! Remote rowset service boundary.
//!
//! The transport behind these calls is owned by the caller; the protocol
//! client only sees request/response values and fault codes.

use hpcview_core::error::RowsetError;
use hpcview_core::filter::{FilterProperty, SortProperty};
use hpcview_core::property::PropertyId;
use hpcview_core::query::{AggregateColumn, RowSetType, RowsetOptions};
use hpcview_core::row::PropertyRow;
use hpcview_core::value::ObjectType;
use std::fmt;

/// Fault codes with local meaning.
pub mod fault_codes {
    /// The rowset id is no longer known to the server.
    pub const STALE_ROWSET: i32 = -2_146_233_079;
    /// The caller may not open rowsets over this object type.
    pub const ACCESS_DENIED: i32 = -2_147_024_891;
    /// Any other server-side failure.
    pub const GENERIC: i32 = -1;
}

/// Error returned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFault {
    pub code: i32,
    pub message: String,
}

impl RemoteFault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn stale(rowset_id: i32) -> Self {
        Self::new(
            fault_codes::STALE_ROWSET,
            format!("rowset {} not found", rowset_id),
        )
    }

    pub fn access_denied(object_type: ObjectType) -> Self {
        Self::new(
            fault_codes::ACCESS_DENIED,
            format!("access denied to {} rowsets", object_type),
        )
    }

    pub fn is_stale(&self) -> bool {
        self.code == fault_codes::STALE_ROWSET
    }

    pub fn is_access_denied(&self) -> bool {
        self.code == fault_codes::ACCESS_DENIED
    }

    /// Map to the rowset error taxonomy.
    pub fn into_rowset_error(self, object_type: ObjectType, rowset_id: i32) -> RowsetError {
        if self.is_access_denied() {
            RowsetError::AccessDenied { object_type }
        } else if self.is_stale() {
            RowsetError::StaleRowset { rowset_id }
        } else {
            RowsetError::Remote {
                code: self.code,
                message: self.message,
            }
        }
    }
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote fault {}: {}", self.code, self.message)
    }
}

/// Everything the server needs to open a rowset. Properties are already in
/// server form.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenRequest {
    pub object_type: ObjectType,
    pub rowset_type: RowSetType,
    pub options: RowsetOptions,
    pub columns: Vec<PropertyId>,
    pub filter: Vec<FilterProperty>,
    pub sort: Vec<SortProperty>,
    pub aggregate: Vec<AggregateColumn>,
    pub group_by: Vec<PropertyId>,
    /// Columns captured when the rowset is frozen.
    pub frozen_columns: Vec<PropertyId>,
    pub top: Option<i32>,
}

impl OpenRequest {
    pub fn new(object_type: ObjectType, rowset_type: RowSetType) -> Self {
        Self {
            object_type,
            rowset_type,
            options: RowsetOptions::empty(),
            columns: Vec::new(),
            filter: Vec::new(),
            sort: Vec::new(),
            aggregate: Vec::new(),
            group_by: Vec::new(),
            frozen_columns: Vec::new(),
            top: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenResponse {
    pub rowset_id: i32,
    pub total_row_count: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataResponse {
    pub rows: Vec<PropertyRow>,
    pub total_row_count: i32,
}

/// Remote rowset calls. Implementations must be callable from any thread.
pub trait RemoteRowsetService: Send + Sync {
    fn open(&self, request: &OpenRequest) -> Result<OpenResponse, RemoteFault>;

    /// Rows `first_row..=last_row`; a range past the end yields the rows
    /// that remain.
    fn get_data(
        &self,
        rowset_id: i32,
        first_row: i32,
        last_row: i32,
        define_boundary: bool,
    ) -> Result<DataResponse, RemoteFault>;

    /// Detach a live rowset into a snapshot; returns the snapshot id.
    fn freeze(&self, rowset_id: i32) -> Result<i32, RemoteFault>;

    /// Keep-alive.
    fn touch(&self, rowset_id: i32) -> Result<(), RemoteFault>;

    fn close(&self, rowset_id: i32) -> Result<(), RemoteFault>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_mapping() {
        let denied = RemoteFault::access_denied(ObjectType::Node);
        assert_eq!(
            denied.into_rowset_error(ObjectType::Node, 3),
            RowsetError::AccessDenied {
                object_type: ObjectType::Node
            }
        );
        assert_eq!(
            RemoteFault::stale(9).into_rowset_error(ObjectType::Job, 9),
            RowsetError::StaleRowset { rowset_id: 9 }
        );
        assert!(matches!(
            RemoteFault::new(fault_codes::GENERIC, "boom").into_rowset_error(ObjectType::Job, 1),
            RowsetError::Remote { code: -1, .. }
        ));
    }
}
