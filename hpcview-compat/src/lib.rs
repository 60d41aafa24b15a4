//! hpcview Compat - Cross-Version Property Conversion
//!
//! Lets a client work with the current property set against an older
//! server. Before a remote call, convertible properties in columns,
//! filters, sorts and set-requests are replaced by the server properties
//! that represent them; after the call, a [`ConversionMap`] rebuilds the
//! client values from the fetched row.

pub mod compat;
pub mod converter;
pub mod converters;
pub mod map;
pub mod registry;

pub use compat::PropertyCompatibility;
pub use converter::{ConverterRef, PropertyConverter, ReadOnlyConverter, VersionMismatchConverter};
pub use converters::{BitFlagConverter, RenameConverter, TaskIdConverter};
pub use map::{ConversionEntry, ConversionMap};
pub use registry::{
    ConverterRegistry, JOB_FLAG_BACKFILL, JOB_FLAG_EXCLUSIVE, JOB_FLAG_FAIL_ON_TASK_FAILURE,
};
