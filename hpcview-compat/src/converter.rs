//! The converter contract and its generic variants.

use hpcview_core::error::CompatError;
use hpcview_core::filter::{FilterProperty, SortProperty};
use hpcview_core::property::PropertyId;
use hpcview_core::row::StoreProperty;
use hpcview_core::value::PropertyValue;
use hpcview_core::version::ServerVersion;
use std::fmt;
use std::sync::Arc;

/// Translates one client-facing property to the server properties that
/// represent it on an older server, and back.
pub trait PropertyConverter: fmt::Debug + Send + Sync {
    /// The client-facing property this converter owns.
    fn client_property(&self) -> &PropertyId;

    /// Every server property the client value is built from.
    fn server_properties(&self) -> &[PropertyId];

    /// Subset of [`server_properties`](Self::server_properties) that must be
    /// present to rebuild the client value.
    fn required_properties(&self) -> &[PropertyId] {
        self.server_properties()
    }

    /// Rebuild the client value. `values` is aligned with
    /// `server_properties()`; unfetched or null entries are `None`.
    fn to_client(&self, values: &[Option<&PropertyValue>]) -> Option<PropertyValue>;

    /// Translate a set-request into server set-requests. `current` is
    /// aligned with `server_properties()` and holds the values the server
    /// has now, `None` where unknown.
    fn to_server(
        &self,
        value: Option<&PropertyValue>,
        current: &[Option<&PropertyValue>],
    ) -> Result<Vec<StoreProperty>, CompatError>;

    fn convert_filter(
        &self,
        filter: &FilterProperty,
        version: ServerVersion,
    ) -> Result<Vec<FilterProperty>, CompatError> {
        Err(CompatError::FilterUnsupported {
            property: filter.property.name().to_string(),
            version,
        })
    }

    fn convert_sort(
        &self,
        sort: &SortProperty,
        version: ServerVersion,
    ) -> Result<Vec<SortProperty>, CompatError> {
        Err(CompatError::SortUnsupported {
            property: sort.property.name().to_string(),
            version,
        })
    }
}

/// Shared converter handle.
pub type ConverterRef = Arc<dyn PropertyConverter>;

// ============================================================================
// READ-ONLY
// ============================================================================

/// Wraps a converter and rejects every set-request.
#[derive(Debug)]
pub struct ReadOnlyConverter {
    inner: ConverterRef,
}

impl ReadOnlyConverter {
    pub fn new(inner: ConverterRef) -> Self {
        Self { inner }
    }

    pub fn wrap(inner: impl PropertyConverter + 'static) -> ConverterRef {
        Arc::new(Self::new(Arc::new(inner)))
    }
}

impl PropertyConverter for ReadOnlyConverter {
    fn client_property(&self) -> &PropertyId {
        self.inner.client_property()
    }

    fn server_properties(&self) -> &[PropertyId] {
        self.inner.server_properties()
    }

    fn required_properties(&self) -> &[PropertyId] {
        self.inner.required_properties()
    }

    fn to_client(&self, values: &[Option<&PropertyValue>]) -> Option<PropertyValue> {
        self.inner.to_client(values)
    }

    fn to_server(
        &self,
        _value: Option<&PropertyValue>,
        _current: &[Option<&PropertyValue>],
    ) -> Result<Vec<StoreProperty>, CompatError> {
        Err(CompatError::ReadOnly {
            property: self.client_property().name().to_string(),
        })
    }

    fn convert_filter(
        &self,
        filter: &FilterProperty,
        version: ServerVersion,
    ) -> Result<Vec<FilterProperty>, CompatError> {
        self.inner.convert_filter(filter, version)
    }

    fn convert_sort(
        &self,
        sort: &SortProperty,
        version: ServerVersion,
    ) -> Result<Vec<SortProperty>, CompatError> {
        self.inner.convert_sort(sort, version)
    }
}

// ============================================================================
// VERSION MISMATCH
// ============================================================================

/// Stand-in for a property the connected server predates: reads are null,
/// writes fail naming the first version that knows the property.
#[derive(Debug)]
pub struct VersionMismatchConverter {
    client: PropertyId,
    connected: ServerVersion,
}

impl VersionMismatchConverter {
    pub fn new(client: PropertyId, connected: ServerVersion) -> Self {
        Self { client, connected }
    }
}

impl PropertyConverter for VersionMismatchConverter {
    fn client_property(&self) -> &PropertyId {
        &self.client
    }

    fn server_properties(&self) -> &[PropertyId] {
        &[]
    }

    fn to_client(&self, _values: &[Option<&PropertyValue>]) -> Option<PropertyValue> {
        None
    }

    fn to_server(
        &self,
        _value: Option<&PropertyValue>,
        _current: &[Option<&PropertyValue>],
    ) -> Result<Vec<StoreProperty>, CompatError> {
        Err(CompatError::VersionIncompatible {
            property: self.client.name().to_string(),
            required: self.client.introduced_in(),
            connected: self.connected,
        })
    }
}
