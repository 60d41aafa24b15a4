//! Change-notification packets.
//!
//! Every frame is `[packetType:4]` followed by a type-specific body.

use hpcview_core::query::EventType;
use hpcview_core::row::StoreProperty;
use hpcview_core::value::ObjectType;
use std::fmt;

/// Frame tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Hello = 1,
    KeepAlive = 2,
    JobEvent = 3,
    TaskEvent = 4,
    ResourceEvent = 5,
    NodeEvent = 6,
    ProfileEvent = 7,
    RowsetChange = 8,
    LegacyTunnel = 9,
}

impl PacketType {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn from_i32(tag: i32) -> Option<Self> {
        Some(match tag {
            1 => PacketType::Hello,
            2 => PacketType::KeepAlive,
            3 => PacketType::JobEvent,
            4 => PacketType::TaskEvent,
            5 => PacketType::ResourceEvent,
            6 => PacketType::NodeEvent,
            7 => PacketType::ProfileEvent,
            8 => PacketType::RowsetChange,
            9 => PacketType::LegacyTunnel,
            _ => return None,
        })
    }
}

/// Entity an object event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Job,
    Task,
    Resource,
    Node,
    Profile,
}

impl EntityKind {
    pub fn packet_type(self) -> PacketType {
        match self {
            EntityKind::Job => PacketType::JobEvent,
            EntityKind::Task => PacketType::TaskEvent,
            EntityKind::Resource => PacketType::ResourceEvent,
            EntityKind::Node => PacketType::NodeEvent,
            EntityKind::Profile => PacketType::ProfileEvent,
        }
    }

    pub fn from_packet_type(ty: PacketType) -> Option<Self> {
        match ty {
            PacketType::JobEvent => Some(EntityKind::Job),
            PacketType::TaskEvent => Some(EntityKind::Task),
            PacketType::ResourceEvent => Some(EntityKind::Resource),
            PacketType::NodeEvent => Some(EntityKind::Node),
            PacketType::ProfileEvent => Some(EntityKind::Profile),
            _ => None,
        }
    }

    pub fn object_type(self) -> ObjectType {
        match self {
            EntityKind::Job => ObjectType::Job,
            EntityKind::Task => ObjectType::Task,
            EntityKind::Resource => ObjectType::Resource,
            EntityKind::Node => ObjectType::Node,
            EntityKind::Profile => ObjectType::Profile,
        }
    }

    pub fn from_object_type(ty: ObjectType) -> Option<Self> {
        match ty {
            ObjectType::Job => Some(EntityKind::Job),
            ObjectType::Task => Some(EntityKind::Task),
            ObjectType::Resource => Some(EntityKind::Resource),
            ObjectType::Node => Some(EntityKind::Node),
            ObjectType::Profile => Some(EntityKind::Profile),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Handshake in both directions. The client sends `client_id = 0` and a
/// null token; the server answers with the connection id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hello {
    pub client_id: i32,
    pub token: Option<String>,
}

/// Job, task, resource, node or profile event.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEvent {
    pub kind: EntityKind,
    pub object_id: i32,
    /// -1 when the entity has no parent.
    pub parent_id: i32,
    pub event_type: EventType,
    pub properties: Vec<StoreProperty>,
}

/// Membership or content change of one Dynamic rowset.
#[derive(Debug, Clone, PartialEq)]
pub struct RowsetChange {
    pub rowset_id: i32,
    pub object_index: i32,
    pub prev_index: i32,
    pub row_count: i32,
    pub event_type: EventType,
    pub object_id: i32,
    pub properties: Vec<StoreProperty>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Hello(Hello),
    KeepAlive,
    Object(ObjectEvent),
    RowsetChange(RowsetChange),
    /// Whole frames wrapped by older servers; decoded by a nested pass.
    LegacyTunnel(Vec<u8>),
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Hello(_) => PacketType::Hello,
            Packet::KeepAlive => PacketType::KeepAlive,
            Packet::Object(event) => event.kind.packet_type(),
            Packet::RowsetChange(_) => PacketType::RowsetChange,
            Packet::LegacyTunnel(_) => PacketType::LegacyTunnel,
        }
    }

    /// Client side of the handshake.
    pub fn client_hello() -> Self {
        Packet::Hello(Hello::default())
    }
}
