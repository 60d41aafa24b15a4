//! Error types for hpcview operations

use crate::property::PropertyType;
use crate::value::ObjectType;
use crate::version::ServerVersion;
use thiserror::Error;

/// Wire codec errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("Unexpected end of stream: needed {needed} bytes, got {got}")]
    UnexpectedEof { needed: usize, got: usize },

    #[error("Deserialization failed: unknown property unique id {unique_id}")]
    UnknownProperty { unique_id: i32 },

    #[error("Unknown packet type {tag}")]
    UnknownPacketType { tag: i32 },

    #[error("Invalid UTF-16 string: {reason}")]
    InvalidString { reason: String },

    #[error("Invalid length {length} for {field}")]
    InvalidLength { field: &'static str, length: i64 },

    #[error("Invalid binary timestamp {binary:#x}")]
    InvalidTimestamp { binary: i64 },

    #[error("Value for {property} has type {got}, declared {expected}")]
    ValueTypeMismatch {
        property: String,
        expected: PropertyType,
        got: &'static str,
    },

    #[error("I/O error: {reason}")]
    Io { reason: String },
}

impl From<std::io::Error> for WireError {
    fn from(err: std::io::Error) -> Self {
        WireError::Io {
            reason: err.to_string(),
        }
    }
}

/// Property model errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PropertyError {
    #[error("Type mismatch for {property}: expected {expected}, got {got}")]
    TypeMismatch {
        property: String,
        expected: PropertyType,
        got: &'static str,
    },

    #[error("Unknown property id {unique_id}")]
    UnknownId { unique_id: i32 },

    #[error("Unknown property name {name}")]
    UnknownName { name: String },

    #[error("Duplicate property id {unique_id}")]
    DuplicateId { unique_id: i32 },
}

/// Cross-version compatibility errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompatError {
    #[error("Property {property} requires server version {required} or later (connected: {connected})")]
    VersionIncompatible {
        property: String,
        required: ServerVersion,
        connected: ServerVersion,
    },

    #[error("Property {property} is read-only")]
    ReadOnly { property: String },

    #[error("Filter on {property} is unsupported on server version {version}")]
    FilterUnsupported {
        property: String,
        version: ServerVersion,
    },

    #[error("Sort on {property} is unsupported on server version {version}")]
    SortUnsupported {
        property: String,
        version: ServerVersion,
    },

    #[error("Setting {property} needs the current value of {server}")]
    CurrentValueRequired { property: String, server: String },
}

/// Rowset protocol errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RowsetError {
    #[error("Access denied opening {object_type} rowset")]
    AccessDenied { object_type: ObjectType },

    #[error("Rowset {rowset_id} is stale")]
    StaleRowset { rowset_id: i32 },

    #[error("Operation requires a dynamic rowset")]
    NotDynamic,

    #[error("Rowset is frozen and read-only until resumed")]
    Frozen,

    #[error("Rowset is not paused")]
    NotFrozen,

    #[error("Rowset has been closed")]
    Closed,

    #[error("Remote rowset call failed with code {code}: {message}")]
    Remote { code: i32, message: String },

    #[error("Invalid row range {first}..={last}")]
    InvalidRange { first: i32, last: i32 },

    #[error("Rowset lock poisoned")]
    LockPoisoned,
}

/// Notification transport errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connect to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("Handshake failed: {reason}")]
    Handshake { reason: String },

    #[error("Transport I/O error: {reason}")]
    Io { reason: String },

    #[error("Transport closed")]
    Closed,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config: {reason}")]
    Io { reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

/// Master error type for all hpcview errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HpcViewError {
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    #[error("Compatibility error: {0}")]
    Compat(#[from] CompatError),

    #[error("Rowset error: {0}")]
    Rowset(#[from] RowsetError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for hpcview operations.
pub type HpcViewResult<T> = Result<T, HpcViewError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_error_display_unknown_property() {
        let err = WireError::UnknownProperty { unique_id: 4242 };
        let msg = format!("{}", err);
        assert!(msg.contains("Deserialization failed"));
        assert!(msg.contains("4242"));
    }

    #[test]
    fn test_compat_error_display_names_required_version() {
        let err = CompatError::VersionIncompatible {
            property: "Job.EstimatedProcessMemory".to_string(),
            required: ServerVersion::V3_SP2,
            connected: ServerVersion::V3,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Job.EstimatedProcessMemory"));
        assert!(msg.contains("3.2.0.0"));
        assert!(msg.contains("3.0.0.0"));
    }

    #[test]
    fn test_rowset_error_display_access_denied() {
        let err = RowsetError::AccessDenied {
            object_type: ObjectType::Node,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Access denied"));
        assert!(msg.contains("Node"));
    }

    #[test]
    fn test_io_error_converts_to_wire_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = WireError::from(io);
        assert!(matches!(err, WireError::Io { .. }));
    }

    #[test]
    fn test_hpcview_error_from_variants() {
        let wire = HpcViewError::from(WireError::UnknownPacketType { tag: 0 });
        assert!(matches!(wire, HpcViewError::Wire(_)));

        let property = HpcViewError::from(PropertyError::UnknownId { unique_id: 1 });
        assert!(matches!(property, HpcViewError::Property(_)));

        let compat = HpcViewError::from(CompatError::ReadOnly {
            property: "Job.Id".to_string(),
        });
        assert!(matches!(compat, HpcViewError::Compat(_)));

        let rowset = HpcViewError::from(RowsetError::Frozen);
        assert!(matches!(rowset, HpcViewError::Rowset(_)));

        let transport = HpcViewError::from(TransportError::Closed);
        assert!(matches!(transport, HpcViewError::Transport(_)));

        let config = HpcViewError::from(ConfigError::MissingRequired {
            field: "scheduler".to_string(),
        });
        assert!(matches!(config, HpcViewError::Config(_)));
    }
}
