//! hpcview Rowset - Remote Rowset Protocol and Local Rowsets
//!
//! [`RemoteRowset`] drives one server-side cursor: lazy open, paging,
//! repositioning, freeze/resume and close, with a single transparent retry
//! on stale cursors. [`LocalRowset`] wraps it with object materialization
//! and a reader/writer lock. [`RowsetRegistry`] is the dispatch table the
//! notification channel uses to reach open Dynamic rowsets.

pub mod dispatch;
pub mod entity;
pub mod local;
pub mod mock;
pub mod protocol;
pub mod service;

pub use dispatch::{ChangeHandler, HandlerId, RowsetChangeEvent, RowsetRegistry, RowsetSink};
pub use entity::{EntityConfig, Materializer};
pub use local::{LocalRowset, RowsetContext, Rows};
pub use mock::{CallCounts, MockRowsetService};
pub use protocol::{RemoteRowset, RowsetState, UNOPENED};
pub use service::{
    fault_codes, DataResponse, OpenRequest, OpenResponse, RemoteFault, RemoteRowsetService,
};
