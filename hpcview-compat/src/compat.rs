//! Per-connection conversion context.

use crate::converter::{ConverterRef, VersionMismatchConverter};
use crate::map::{ConversionEntry, ConversionMap};
use hpcview_core::error::CompatError;
use hpcview_core::filter::{FilterProperty, SortProperty};
use hpcview_core::property::PropertyId;
use hpcview_core::row::{PropertyRow, StoreProperty};
use hpcview_core::value::PropertyValue;
use hpcview_core::version::ServerVersion;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;

/// Converters selected for one connected server version.
///
/// Properties without an explicit rule whose introduction version is newer
/// than the server get a [`VersionMismatchConverter`].
#[derive(Debug, Clone)]
pub struct PropertyCompatibility {
    version: ServerVersion,
    converters: HashMap<i32, ConverterRef>,
}

impl PropertyCompatibility {
    pub fn new(version: ServerVersion, converters: HashMap<i32, ConverterRef>) -> Self {
        Self {
            version,
            converters,
        }
    }

    /// Context that never converts (server at the client's own version).
    pub fn passthrough() -> Self {
        Self::new(ServerVersion::current(), HashMap::new())
    }

    pub fn version(&self) -> ServerVersion {
        self.version
    }

    pub fn converter_for(&self, id: &PropertyId) -> Option<ConverterRef> {
        if let Some(conv) = self.converters.get(&id.unique_id()) {
            return Some(Arc::clone(conv));
        }
        if !self.version.supports(id.introduced_in()) {
            trace!(property = %id, required = %id.introduced_in(), connected = %self.version, "property predates server");
            return Some(Arc::new(VersionMismatchConverter::new(
                id.clone(),
                self.version,
            )));
        }
        None
    }

    pub fn needs_conversion(&self, ids: &[PropertyId]) -> bool {
        ids.iter().any(|id| self.converter_for(id).is_some())
    }

    /// Replace convertible columns by their server columns.
    ///
    /// Server columns are de-duplicated; a column requested directly keeps
    /// its place and is shared with converters that need it.
    pub fn expand_columns(&self, columns: &[PropertyId]) -> ConversionMap {
        let mut server_columns: Vec<PropertyId> = Vec::with_capacity(columns.len());
        let mut position: HashMap<i32, usize> = HashMap::with_capacity(columns.len());
        let mut place = |id: &PropertyId, server_columns: &mut Vec<PropertyId>| -> usize {
            *position.entry(id.unique_id()).or_insert_with(|| {
                server_columns.push(id.clone());
                server_columns.len() - 1
            })
        };

        let direct: HashSet<i32> = columns
            .iter()
            .filter(|id| self.converter_for(id).is_none())
            .map(PropertyId::unique_id)
            .collect();
        let mut replacement_only = HashSet::new();
        let mut entries = Vec::with_capacity(columns.len());

        for id in columns {
            match self.converter_for(id) {
                None => {
                    let pos = place(id, &mut server_columns);
                    entries.push(ConversionEntry {
                        client: id.clone(),
                        converter: None,
                        positions: vec![pos],
                    });
                }
                Some(conv) => {
                    let positions = conv
                        .server_properties()
                        .iter()
                        .map(|server| {
                            if !direct.contains(&server.unique_id()) {
                                replacement_only.insert(server.unique_id());
                            }
                            place(server, &mut server_columns)
                        })
                        .collect();
                    entries.push(ConversionEntry {
                        client: id.clone(),
                        converter: Some(conv),
                        positions,
                    });
                }
            }
        }
        ConversionMap::new(entries, server_columns, replacement_only)
    }

    pub fn expand_filters(
        &self,
        filters: &[FilterProperty],
    ) -> Result<Vec<FilterProperty>, CompatError> {
        let mut out = Vec::with_capacity(filters.len());
        for filter in filters {
            match self.converter_for(&filter.property) {
                Some(conv) => out.extend(conv.convert_filter(filter, self.version)?),
                None => out.push(filter.clone()),
            }
        }
        Ok(out)
    }

    pub fn expand_sorts(&self, sorts: &[SortProperty]) -> Result<Vec<SortProperty>, CompatError> {
        let mut out = Vec::with_capacity(sorts.len());
        for sort in sorts {
            match self.converter_for(&sort.property) {
                Some(conv) => out.extend(conv.convert_sort(sort, self.version)?),
                None => out.push(sort.clone()),
            }
        }
        Ok(out)
    }

    /// Translate set-requests; the server receives only server properties.
    ///
    /// `current` is the object's row as last fetched in server properties.
    /// Converters that rewrite a shared server property (flag masks) read
    /// its current value from there, or from an earlier write in the same
    /// request, so later writes build on earlier ones.
    pub fn expand_sets(
        &self,
        props: &[StoreProperty],
        current: &PropertyRow,
    ) -> Result<Vec<StoreProperty>, CompatError> {
        let mut out: Vec<StoreProperty> = Vec::with_capacity(props.len());
        for prop in props {
            let converted = match self.converter_for(&prop.id) {
                Some(conv) => {
                    let known: Vec<Option<PropertyValue>> = conv
                        .server_properties()
                        .iter()
                        .map(|server| match out.iter().find(|p| p.id == *server) {
                            Some(pending) => pending.value.clone(),
                            None => current.value(server).cloned(),
                        })
                        .collect();
                    let known: Vec<Option<&PropertyValue>> =
                        known.iter().map(Option::as_ref).collect();
                    conv.to_server(prop.value.as_ref(), &known)?
                }
                None => vec![prop.clone()],
            };
            for server in converted {
                match out.iter_mut().find(|p| p.id == server.id) {
                    Some(existing) => *existing = server,
                    None => out.push(server),
                }
            }
        }
        Ok(out)
    }
}
