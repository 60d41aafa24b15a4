//! Packet encoding with a per-session property cache.

use crate::codec::encode_property;
use crate::packet::{Hello, ObjectEvent, Packet, RowsetChange};
use crate::writer::WireWriter;
use hpcview_core::error::WireError;
use hpcview_core::row::StoreProperty;
use hpcview_core::value::PropertyValue;
use std::collections::HashMap;
use tracing::trace;

/// Entries kept before the cache is dropped wholesale.
pub const DEFAULT_CACHE_CAPACITY: usize = 4096;

/// Serialized property entries keyed by (unique id, object id).
///
/// An entry is reused only while the value is unchanged, so the output
/// bytes are identical with or without the cache.
#[derive(Debug)]
pub struct EncodeCache {
    entries: HashMap<(i32, i32), (Option<PropertyValue>, Vec<u8>)>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl Default for EncodeCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl EncodeCache {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn write(
        &mut self,
        prop: &StoreProperty,
        object_id: i32,
        w: &mut WireWriter,
    ) -> Result<(), WireError> {
        let key = (prop.id.unique_id(), object_id);
        if let Some((value, bytes)) = self.entries.get(&key) {
            if *value == prop.value {
                self.hits += 1;
                w.write_raw(bytes);
                return Ok(());
            }
        }
        self.misses += 1;
        let mut entry = WireWriter::new();
        encode_property(prop, &mut entry)?;
        w.write_raw(entry.as_bytes());
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            trace!(capacity = self.capacity, "encode cache full, clearing");
            self.entries.clear();
        }
        self.entries
            .insert(key, (prop.value.clone(), entry.into_bytes()));
        Ok(())
    }
}

/// Encodes packets; property entries go through an [`EncodeCache`] for the
/// lifetime of one dispatch session.
#[derive(Debug, Default)]
pub struct PacketEncoder {
    cache: EncodeCache,
}

impl PacketEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        Self {
            cache: EncodeCache::with_capacity(capacity),
        }
    }

    pub fn cache(&self) -> &EncodeCache {
        &self.cache
    }

    /// Forget cached entries at the end of a dispatch session.
    pub fn end_session(&mut self) {
        self.cache.clear();
    }

    pub fn encode(&mut self, packet: &Packet) -> Result<Vec<u8>, WireError> {
        let mut w = WireWriter::with_capacity(64);
        self.encode_into(packet, &mut w)?;
        Ok(w.into_bytes())
    }

    pub fn encode_into(&mut self, packet: &Packet, w: &mut WireWriter) -> Result<(), WireError> {
        w.write_i32(packet.packet_type().as_i32());
        match packet {
            Packet::Hello(hello) => write_hello(hello, w),
            Packet::KeepAlive => {}
            Packet::Object(event) => self.write_object_event(event, w)?,
            Packet::RowsetChange(change) => self.write_rowset_change(change, w)?,
            Packet::LegacyTunnel(bytes) => w.write_binary(bytes),
        }
        Ok(())
    }

    fn write_object_event(&mut self, event: &ObjectEvent, w: &mut WireWriter) -> Result<(), WireError> {
        w.write_i32(event.object_id);
        w.write_i32(event.parent_id);
        w.write_i32(event.event_type.object_code());
        self.write_properties(&event.properties, event.object_id, w)
    }

    fn write_rowset_change(
        &mut self,
        change: &RowsetChange,
        w: &mut WireWriter,
    ) -> Result<(), WireError> {
        w.write_i32(change.rowset_id);
        w.write_i32(change.object_index);
        w.write_i32(change.prev_index);
        w.write_i32(change.row_count);
        w.write_i32(change.event_type.rowset_code());
        w.write_i32(change.object_id);
        self.write_properties(&change.properties, change.object_id, w)
    }

    fn write_properties(
        &mut self,
        props: &[StoreProperty],
        object_id: i32,
        w: &mut WireWriter,
    ) -> Result<(), WireError> {
        w.write_len(props.len());
        for prop in props {
            self.cache.write(prop, object_id, w)?;
        }
        Ok(())
    }
}

fn write_hello(hello: &Hello, w: &mut WireWriter) {
    w.write_i32(hello.client_id);
    w.write_nullable_string(hello.token.as_deref());
}

/// Encode a single packet without caching.
pub fn encode_packet(packet: &Packet) -> Result<Vec<u8>, WireError> {
    PacketEncoder::with_cache_capacity(1).encode(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::EntityKind;
    use hpcview_core::query::EventType;
    use hpcview_core::well_known;

    fn job_event(name: &str) -> Packet {
        Packet::Object(ObjectEvent {
            kind: EntityKind::Job,
            object_id: 12,
            parent_id: -1,
            event_type: EventType::Modify,
            properties: vec![
                StoreProperty::new(well_known::JOB_NAME.clone(), Some(name.into())).unwrap(),
                StoreProperty::new(well_known::JOB_STATE.clone(), Some(PropertyValue::Enum(3)))
                    .unwrap(),
            ],
        })
    }

    #[test]
    fn test_client_hello_bytes() {
        let bytes = encode_packet(&Packet::client_hello()).unwrap();
        assert_eq!(bytes, vec![1, 0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_cache_does_not_change_output() {
        let mut encoder = PacketEncoder::new();
        let first = encoder.encode(&job_event("a")).unwrap();
        let again = encoder.encode(&job_event("a")).unwrap();
        assert_eq!(first, again);
        assert_eq!(encoder.cache().hits(), 2);

        let changed = encoder.encode(&job_event("b")).unwrap();
        assert_eq!(changed, encode_packet(&job_event("b")).unwrap());
        assert_ne!(changed, first);
    }

    #[test]
    fn test_end_session_clears_cache() {
        let mut encoder = PacketEncoder::new();
        encoder.encode(&job_event("a")).unwrap();
        assert_eq!(encoder.cache().len(), 2);
        encoder.end_session();
        assert!(encoder.cache().is_empty());
    }

    #[test]
    fn test_cache_capacity_bounded() {
        let mut encoder = PacketEncoder::with_cache_capacity(1);
        encoder.encode(&job_event("a")).unwrap();
        assert_eq!(encoder.cache().len(), 1);
    }
}
