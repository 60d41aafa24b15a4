//! Conversion map for one query shape.
//!
//! Built when the column list changes; records, for every requested client
//! property, which server columns carry its value and where they land in
//! the server column list.

use crate::converter::ConverterRef;
use hpcview_core::property::PropertyId;
use hpcview_core::row::{PropertyRow, StoreProperty};
use hpcview_core::value::PropertyValue;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct ConversionEntry {
    pub client: PropertyId,
    /// `None` when the property is sent as-is.
    pub converter: Option<ConverterRef>,
    /// Positions in [`ConversionMap::server_columns`].
    pub positions: Vec<usize>,
}

impl ConversionEntry {
    pub fn is_converted(&self) -> bool {
        self.converter.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversionMap {
    entries: Vec<ConversionEntry>,
    server_columns: Vec<PropertyId>,
    /// Server columns that only exist to carry a converted value.
    replacement_only: HashSet<i32>,
}

impl ConversionMap {
    pub(crate) fn new(
        entries: Vec<ConversionEntry>,
        server_columns: Vec<PropertyId>,
        replacement_only: HashSet<i32>,
    ) -> Self {
        Self {
            entries,
            server_columns,
            replacement_only,
        }
    }

    /// Map that passes `columns` through untouched.
    pub fn identity(columns: &[PropertyId]) -> Self {
        let entries = columns
            .iter()
            .enumerate()
            .map(|(pos, id)| ConversionEntry {
                client: id.clone(),
                converter: None,
                positions: vec![pos],
            })
            .collect();
        Self::new(entries, columns.to_vec(), HashSet::new())
    }

    pub fn entries(&self) -> &[ConversionEntry] {
        &self.entries
    }

    pub fn entry(&self, client: &PropertyId) -> Option<&ConversionEntry> {
        self.entries.iter().find(|e| e.client == *client)
    }

    /// Columns to send to the server.
    pub fn server_columns(&self) -> &[PropertyId] {
        &self.server_columns
    }

    pub fn client_columns(&self) -> impl Iterator<Item = &PropertyId> {
        self.entries.iter().map(|e| &e.client)
    }

    /// True when no requested property needs conversion.
    pub fn is_identity(&self) -> bool {
        self.entries.iter().all(|e| !e.is_converted())
    }

    /// Rebuild client values from a server row.
    ///
    /// Converted properties are produced only when every required server
    /// column is present in `row`; otherwise they are null. With `strip`,
    /// server columns that were fetched only as replacements are removed.
    pub fn restore_row(&self, row: &PropertyRow, strip: bool) -> PropertyRow {
        if self.is_identity() {
            return row.clone();
        }
        let mut out: Vec<StoreProperty> = Vec::with_capacity(row.len());
        let mut emitted: HashSet<i32> = HashSet::with_capacity(self.entries.len());

        for entry in &self.entries {
            let value = match &entry.converter {
                None => {
                    if !row.contains(&entry.client) {
                        continue;
                    }
                    self.lookup(row, &entry.client, entry.positions.first().copied())
                        .cloned()
                }
                Some(conv) => {
                    let servers = conv.server_properties();
                    if !servers.is_empty() && !servers.iter().any(|s| row.contains(s)) {
                        continue;
                    }
                    let complete = conv.required_properties().iter().all(|r| row.contains(r));
                    if complete {
                        let values: Vec<Option<&PropertyValue>> = servers
                            .iter()
                            .enumerate()
                            .map(|(i, id)| self.lookup(row, id, entry.positions.get(i).copied()))
                            .collect();
                        conv.to_client(&values)
                    } else {
                        None
                    }
                }
            };
            emitted.insert(entry.client.unique_id());
            out.push(StoreProperty {
                id: entry.client.clone(),
                value,
            });
        }

        for prop in row.iter() {
            let uid = prop.id.unique_id();
            if emitted.contains(&uid) {
                continue;
            }
            if strip && self.replacement_only.contains(&uid) {
                continue;
            }
            emitted.insert(uid);
            out.push(prop.clone());
        }
        PropertyRow::indexed(out)
    }

    /// Value by recorded position when the row is in server-column order,
    /// by id otherwise.
    fn lookup<'r>(
        &self,
        row: &'r PropertyRow,
        id: &PropertyId,
        position: Option<usize>,
    ) -> Option<&'r PropertyValue> {
        if let Some(prop) = position.and_then(|p| row.get_at(p)) {
            if prop.id == *id {
                return prop.value.as_ref();
            }
        }
        row.value(id)
    }
}
