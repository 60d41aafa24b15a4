//! hpcview Core - Property Model
//!
//! Typed property ids, values and rows shared by every other crate, plus the
//! error taxonomy and client configuration. No I/O beyond config loading.

pub mod config;
pub mod error;
pub mod filter;
pub mod property;
pub mod query;
pub mod row;
pub mod value;
pub mod version;
pub mod well_known;

pub use config::{ClientConfig, NotificationConfig, RowsetConfig, TransportKind};
pub use error::{
    CompatError, ConfigError, HpcViewError, HpcViewResult, PropertyError, RowsetError,
    TransportError, WireError,
};
pub use filter::{FilterOperator, FilterProperty, FilterValue, SortOrder, SortProperty};
pub use property::{
    EnumKind, PropertyDescriptor, PropertyFlags, PropertyId, PropertyRegistry, PropertyType,
    CUSTOM_PROPERTY_BASE,
};
pub use query::{
    AggregateColumn, AggregateFunction, EventType, RowSetType, RowsetOptions, SeekOrigin,
};
pub use row::{PropertyRow, StoreProperty};
pub use value::{ObjectHandle, ObjectType, PropertyValue, TaskIdentifier};
pub use version::{ServerVersion, ServerVersionParseError};
