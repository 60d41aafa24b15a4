//! Typed property identifiers and the property registry.
//!
//! A [`PropertyId`] is created once (usually from the well-known table) and
//! looked up by unique id or name afterwards. Clones share the same
//! descriptor, so passing ids around is cheap.

use crate::error::PropertyError;
use crate::version::ServerVersion;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

// ============================================================================
// VALUE TYPES
// ============================================================================

/// Domain enumerations whose values travel as 4-byte integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnumKind {
    JobState,
    TaskState,
    NodeState,
    NodeAvailability,
    NodeLocation,
    JobPriority,
    JobUnitType,
    JobType,
    TaskType,
    ResourceState,
    ResourceJobPhase,
    AllocationState,
    CancelRequest,
    FailureReason,
    JobRuntimeType,
    JobNodeGroupOp,
    JobOrderBy,
    PendingReason,
    NodeEvent,
    ProfileItemType,
}

/// Declared value type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    Int32,
    Int64,
    UInt32,
    Bool,
    String,
    StringList,
    DateTime,
    Guid,
    Binary,
    /// The domain object itself; materialized client-side, never on the wire.
    Object,
    /// Composite task identifier (parent job id, job task id, instance id).
    TaskId,
    Enum(EnumKind),
}

impl PropertyType {
    /// Short name used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Int32 => "int32",
            PropertyType::Int64 => "int64",
            PropertyType::UInt32 => "uint32",
            PropertyType::Bool => "bool",
            PropertyType::String => "string",
            PropertyType::StringList => "string-list",
            PropertyType::DateTime => "datetime",
            PropertyType::Guid => "guid",
            PropertyType::Binary => "binary",
            PropertyType::Object => "object",
            PropertyType::TaskId => "task-id",
            PropertyType::Enum(_) => "enum",
        }
    }

    /// Whether values of this type can be ordered (for range filters and sorting).
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            PropertyType::Int32
                | PropertyType::Int64
                | PropertyType::UInt32
                | PropertyType::String
                | PropertyType::DateTime
                | PropertyType::Enum(_)
        )
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::Enum(kind) => write!(f, "enum:{:?}", kind),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

bitflags! {
    /// Attribute bits carried by every property.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct PropertyFlags: u32 {
        const READ_ONLY = 0x0001;
        const CALCULATED = 0x0002;
        const CUSTOM = 0x0004;
        const PRIVATE = 0x0008;
        const OBSOLETE = 0x0010;
        const INDEXED = 0x0020;
    }
}

// ============================================================================
// PROPERTY ID
// ============================================================================

/// Immutable description of a property.
#[derive(Debug)]
pub struct PropertyDescriptor {
    pub unique_id: i32,
    pub name: String,
    pub value_type: PropertyType,
    pub flags: PropertyFlags,
    /// First server version that knows this property.
    pub introduced_in: ServerVersion,
}

/// Typed property key. Equality and hashing use the unique id only.
#[derive(Clone)]
pub struct PropertyId(Arc<PropertyDescriptor>);

impl PropertyId {
    /// Create a property known since the oldest supported server.
    pub fn new(
        unique_id: i32,
        name: impl Into<String>,
        value_type: PropertyType,
        flags: PropertyFlags,
    ) -> Self {
        Self::introduced(unique_id, name, value_type, flags, ServerVersion::V2)
    }

    /// Create a property that first appeared in `introduced_in`.
    pub fn introduced(
        unique_id: i32,
        name: impl Into<String>,
        value_type: PropertyType,
        flags: PropertyFlags,
        introduced_in: ServerVersion,
    ) -> Self {
        Self(Arc::new(PropertyDescriptor {
            unique_id,
            name: name.into(),
            value_type,
            flags,
            introduced_in,
        }))
    }

    pub fn unique_id(&self) -> i32 {
        self.0.unique_id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn value_type(&self) -> PropertyType {
        self.0.value_type
    }

    pub fn flags(&self) -> PropertyFlags {
        self.0.flags
    }

    pub fn introduced_in(&self) -> ServerVersion {
        self.0.introduced_in
    }

    pub fn is_read_only(&self) -> bool {
        self.0.flags.contains(PropertyFlags::READ_ONLY)
    }

    pub fn is_custom(&self) -> bool {
        self.0.flags.contains(PropertyFlags::CUSTOM)
    }

    pub fn descriptor(&self) -> &PropertyDescriptor {
        &self.0
    }
}

impl PartialEq for PropertyId {
    fn eq(&self, other: &Self) -> bool {
        self.0.unique_id == other.0.unique_id
    }
}

impl Eq for PropertyId {}

impl Hash for PropertyId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.unique_id.hash(state);
    }
}

impl fmt::Debug for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.0.name, self.0.unique_id)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.name)
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// First unique id handed out to custom properties.
pub const CUSTOM_PROPERTY_BASE: i32 = 0x0100_0000;

/// Lookup table from unique id and name to [`PropertyId`].
#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    by_id: HashMap<i32, PropertyId>,
    by_name: HashMap<String, PropertyId>,
    next_custom: i32,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            next_custom: CUSTOM_PROPERTY_BASE,
        }
    }

    /// Build a registry from a list of ids; fails on duplicate unique ids.
    pub fn from_properties(
        props: impl IntoIterator<Item = PropertyId>,
    ) -> Result<Self, PropertyError> {
        let mut registry = Self::new();
        for prop in props {
            registry.register(prop)?;
        }
        Ok(registry)
    }

    /// The process-wide table of well-known properties.
    pub fn well_known() -> &'static PropertyRegistry {
        crate::well_known::registry()
    }

    pub fn register(&mut self, prop: PropertyId) -> Result<(), PropertyError> {
        if self.by_id.contains_key(&prop.unique_id()) {
            return Err(PropertyError::DuplicateId {
                unique_id: prop.unique_id(),
            });
        }
        if prop.unique_id() >= self.next_custom {
            self.next_custom = prop.unique_id() + 1;
        }
        self.by_name.insert(prop.name().to_string(), prop.clone());
        self.by_id.insert(prop.unique_id(), prop);
        Ok(())
    }

    /// Register a custom (user-defined) property, assigning the next free custom id.
    pub fn register_custom(
        &mut self,
        name: impl Into<String>,
        value_type: PropertyType,
    ) -> Result<PropertyId, PropertyError> {
        let name = name.into();
        if let Some(existing) = self.by_name.get(&name) {
            if existing.value_type() == value_type {
                return Ok(existing.clone());
            }
            return Err(PropertyError::TypeMismatch {
                property: name,
                expected: existing.value_type(),
                got: value_type.as_str(),
            });
        }
        let prop = PropertyId::new(self.next_custom, name, value_type, PropertyFlags::CUSTOM);
        self.register(prop.clone())?;
        Ok(prop)
    }

    pub fn get(&self, unique_id: i32) -> Option<&PropertyId> {
        self.by_id.get(&unique_id)
    }

    pub fn by_name(&self, name: &str) -> Option<&PropertyId> {
        self.by_name.get(name)
    }

    /// Look up by unique id, failing with [`PropertyError::UnknownId`].
    pub fn resolve(&self, unique_id: i32) -> Result<&PropertyId, PropertyError> {
        self.get(unique_id)
            .ok_or(PropertyError::UnknownId { unique_id })
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PropertyId> {
        self.by_id.values()
    }
}
