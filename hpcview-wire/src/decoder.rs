//! Packet decoding.

use crate::codec::decode_property;
use crate::packet::{EntityKind, Hello, ObjectEvent, Packet, PacketType, RowsetChange};
use crate::reader::WireReader;
use hpcview_core::error::WireError;
use hpcview_core::property::PropertyRegistry;
use hpcview_core::query::EventType;
use hpcview_core::row::StoreProperty;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::trace;

/// Tunnels nested deeper than this are rejected.
pub const MAX_TUNNEL_DEPTH: usize = 4;

/// Decodes packets, resolving property ids against a registry.
#[derive(Debug, Clone)]
pub struct PacketDecoder {
    registry: Arc<PropertyRegistry>,
}

impl PacketDecoder {
    pub fn new(registry: Arc<PropertyRegistry>) -> Self {
        Self { registry }
    }

    /// Decoder over the well-known property table.
    pub fn well_known() -> Self {
        Self::new(Arc::new(PropertyRegistry::well_known().clone()))
    }

    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    /// Read exactly one frame from `src`.
    pub fn read_packet(&self, src: &mut dyn Read) -> Result<Packet, WireError> {
        let mut r = WireReader::new(src);
        self.read_frame(&mut r)
    }

    /// Decode every frame in `bytes`, replacing legacy tunnels by the frames
    /// they carry.
    pub fn decode_buffer(&self, bytes: &[u8]) -> Result<Vec<Packet>, WireError> {
        let mut out = Vec::new();
        self.decode_nested(bytes, 0, &mut out)?;
        Ok(out)
    }

    fn decode_nested(
        &self,
        bytes: &[u8],
        depth: usize,
        out: &mut Vec<Packet>,
    ) -> Result<(), WireError> {
        if depth > MAX_TUNNEL_DEPTH {
            return Err(WireError::InvalidLength {
                field: "tunnel depth",
                length: depth as i64,
            });
        }
        let mut cursor = Cursor::new(bytes);
        while (cursor.position() as usize) < bytes.len() {
            let packet = self.read_packet(&mut cursor)?;
            match packet {
                Packet::LegacyTunnel(inner) => {
                    trace!(len = inner.len(), depth, "decoding legacy tunnel");
                    self.decode_nested(&inner, depth + 1, out)?;
                }
                other => out.push(other),
            }
        }
        Ok(())
    }

    fn read_frame(&self, r: &mut WireReader<'_>) -> Result<Packet, WireError> {
        let tag = r.read_i32()?;
        let ty = PacketType::from_i32(tag).ok_or(WireError::UnknownPacketType { tag })?;
        let packet = match ty {
            PacketType::Hello => Packet::Hello(Hello {
                client_id: r.read_i32()?,
                token: r.read_nullable_string()?,
            }),
            PacketType::KeepAlive => Packet::KeepAlive,
            PacketType::RowsetChange => Packet::RowsetChange(self.read_rowset_change(r)?),
            PacketType::LegacyTunnel => Packet::LegacyTunnel(r.read_binary()?),
            PacketType::JobEvent
            | PacketType::TaskEvent
            | PacketType::ResourceEvent
            | PacketType::NodeEvent
            | PacketType::ProfileEvent => {
                let kind = EntityKind::from_packet_type(ty)
                    .ok_or(WireError::UnknownPacketType { tag })?;
                Packet::Object(self.read_object_event(kind, r)?)
            }
        };
        trace!(packet_type = ?ty, "decoded packet");
        Ok(packet)
    }

    fn read_object_event(
        &self,
        kind: EntityKind,
        r: &mut WireReader<'_>,
    ) -> Result<ObjectEvent, WireError> {
        let object_id = r.read_i32()?;
        let parent_id = r.read_i32()?;
        let event_type = EventType::from_object_code(r.read_i32()?);
        let properties = self.read_properties(r)?;
        Ok(ObjectEvent {
            kind,
            object_id,
            parent_id,
            event_type,
            properties,
        })
    }

    fn read_rowset_change(&self, r: &mut WireReader<'_>) -> Result<RowsetChange, WireError> {
        Ok(RowsetChange {
            rowset_id: r.read_i32()?,
            object_index: r.read_i32()?,
            prev_index: r.read_i32()?,
            row_count: r.read_i32()?,
            event_type: EventType::from_rowset_code(r.read_i32()?),
            object_id: r.read_i32()?,
            properties: self.read_properties(r)?,
        })
    }

    fn read_properties(&self, r: &mut WireReader<'_>) -> Result<Vec<StoreProperty>, WireError> {
        let count = r.read_len("property count")?;
        let mut props = Vec::with_capacity(count.min(256));
        for _ in 0..count {
            props.push(decode_property(r, |id| self.registry.get(id))?);
        }
        Ok(props)
    }
}
