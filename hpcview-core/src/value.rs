//! Property values and the domain object handles substituted for id columns.

use crate::property::PropertyType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// OBJECT TYPES
// ============================================================================

/// Server-side collection a rowset (or an event) refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Job,
    Task,
    Node,
    Resource,
    Allocation,
    JobTemplate,
    Pool,
    Profile,
}

impl ObjectType {
    /// Integer tag sent to the remote rowset service.
    pub fn as_i32(&self) -> i32 {
        match self {
            ObjectType::Job => 1,
            ObjectType::Task => 2,
            ObjectType::Node => 3,
            ObjectType::Resource => 4,
            ObjectType::Allocation => 5,
            ObjectType::JobTemplate => 6,
            ObjectType::Pool => 7,
            ObjectType::Profile => 8,
        }
    }

    pub fn from_i32(tag: i32) -> Option<Self> {
        Some(match tag {
            1 => ObjectType::Job,
            2 => ObjectType::Task,
            3 => ObjectType::Node,
            4 => ObjectType::Resource,
            5 => ObjectType::Allocation,
            6 => ObjectType::JobTemplate,
            7 => ObjectType::Pool,
            8 => ObjectType::Profile,
            _ => return None,
        })
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Client-side handle for a domain object materialized from a row.
///
/// Handles only identify the object; property access goes through the
/// domain proxies, which live outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectHandle {
    pub object_type: ObjectType,
    pub id: i32,
    pub parent_id: Option<i32>,
}

impl ObjectHandle {
    pub fn new(object_type: ObjectType, id: i32) -> Self {
        Self {
            object_type,
            id,
            parent_id: None,
        }
    }

    pub fn with_parent(object_type: ObjectType, id: i32, parent_id: i32) -> Self {
        Self {
            object_type,
            id,
            parent_id: Some(parent_id),
        }
    }
}

/// Composite task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskIdentifier {
    pub parent_job_id: i32,
    pub job_task_id: i32,
    pub instance_id: i32,
}

impl TaskIdentifier {
    pub const fn new(parent_job_id: i32, job_task_id: i32, instance_id: i32) -> Self {
        Self {
            parent_job_id,
            job_task_id,
            instance_id,
        }
    }
}

impl fmt::Display for TaskIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            self.parent_job_id, self.job_task_id, self.instance_id
        )
    }
}

// ============================================================================
// PROPERTY VALUE
// ============================================================================

/// Runtime value of a property. Variants mirror [`PropertyType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    Bool(bool),
    String(String),
    StringList(Vec<String>),
    DateTime(DateTime<Utc>),
    Guid(Uuid),
    Binary(Vec<u8>),
    Object(ObjectHandle),
    TaskId(TaskIdentifier),
    /// Value of a domain enumeration, carried as its integer representation.
    Enum(i32),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Int32(_) => "int32",
            PropertyValue::Int64(_) => "int64",
            PropertyValue::UInt32(_) => "uint32",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::String(_) => "string",
            PropertyValue::StringList(_) => "string-list",
            PropertyValue::DateTime(_) => "datetime",
            PropertyValue::Guid(_) => "guid",
            PropertyValue::Binary(_) => "binary",
            PropertyValue::Object(_) => "object",
            PropertyValue::TaskId(_) => "task-id",
            PropertyValue::Enum(_) => "enum",
        }
    }

    /// Whether this value may be stored under a property declared as `ty`.
    pub fn matches_type(&self, ty: PropertyType) -> bool {
        matches!(
            (self, ty),
            (PropertyValue::Int32(_), PropertyType::Int32)
                | (PropertyValue::Int64(_), PropertyType::Int64)
                | (PropertyValue::UInt32(_), PropertyType::UInt32)
                | (PropertyValue::Bool(_), PropertyType::Bool)
                | (PropertyValue::String(_), PropertyType::String)
                | (PropertyValue::StringList(_), PropertyType::StringList)
                | (PropertyValue::DateTime(_), PropertyType::DateTime)
                | (PropertyValue::Guid(_), PropertyType::Guid)
                | (PropertyValue::Binary(_), PropertyType::Binary)
                | (PropertyValue::Object(_), PropertyType::Object)
                | (PropertyValue::TaskId(_), PropertyType::TaskId)
                | (PropertyValue::Enum(_), PropertyType::Enum(_))
        )
    }

    /// Compare two values of the same variant.
    ///
    /// Returns `None` for mismatched variants and for unordered types;
    /// callers treat that as "no match".
    pub fn compare(&self, other: &PropertyValue) -> Option<Ordering> {
        match (self, other) {
            (PropertyValue::Int32(a), PropertyValue::Int32(b)) => Some(a.cmp(b)),
            (PropertyValue::Int64(a), PropertyValue::Int64(b)) => Some(a.cmp(b)),
            (PropertyValue::UInt32(a), PropertyValue::UInt32(b)) => Some(a.cmp(b)),
            (PropertyValue::Enum(a), PropertyValue::Enum(b)) => Some(a.cmp(b)),
            (PropertyValue::String(a), PropertyValue::String(b)) => Some(a.cmp(b)),
            (PropertyValue::DateTime(a), PropertyValue::DateTime(b)) => Some(a.cmp(b)),
            (PropertyValue::TaskId(a), PropertyValue::TaskId(b)) => Some(a.cmp(b)),
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => Some(a.cmp(b)),
            (PropertyValue::Guid(a), PropertyValue::Guid(b)) => Some(a.cmp(b)),
            (a, b) if a == b => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Integer view used by bit-mask filters.
    pub fn as_bits(&self) -> Option<i64> {
        match self {
            PropertyValue::Int32(v) | PropertyValue::Enum(v) => Some(*v as i64),
            PropertyValue::UInt32(v) => Some(*v as i64),
            PropertyValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            PropertyValue::Int32(v) | PropertyValue::Enum(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            PropertyValue::Object(h) => Some(h),
            _ => None,
        }
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int32(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int64(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<TaskIdentifier> for PropertyValue {
    fn from(v: TaskIdentifier) -> Self {
        PropertyValue::TaskId(v)
    }
}

impl From<ObjectHandle> for PropertyValue {
    fn from(v: ObjectHandle) -> Self {
        PropertyValue::Object(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::EnumKind;

    #[test]
    fn test_matches_type() {
        assert!(PropertyValue::Int32(1).matches_type(PropertyType::Int32));
        assert!(!PropertyValue::Int32(1).matches_type(PropertyType::Int64));
        assert!(PropertyValue::Enum(3).matches_type(PropertyType::Enum(EnumKind::JobState)));
        assert!(PropertyValue::Enum(3).matches_type(PropertyType::Enum(EnumKind::NodeState)));
        assert!(!PropertyValue::String("x".into()).matches_type(PropertyType::StringList));
    }

    #[test]
    fn test_compare_mismatched_variants_is_none() {
        assert_eq!(PropertyValue::Int32(1).compare(&PropertyValue::Int64(1)), None);
        assert_eq!(
            PropertyValue::Int32(1).compare(&PropertyValue::String("1".into())),
            None
        );
        assert_eq!(
            PropertyValue::Int32(1).compare(&PropertyValue::Int32(2)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_compare_unordered_equal_values() {
        let a = PropertyValue::Binary(vec![1, 2]);
        assert_eq!(a.compare(&PropertyValue::Binary(vec![1, 2])), Some(Ordering::Equal));
        assert_eq!(a.compare(&PropertyValue::Binary(vec![3])), None);
    }

    #[test]
    fn test_object_type_tags_round_trip() {
        for ty in [
            ObjectType::Job,
            ObjectType::Task,
            ObjectType::Node,
            ObjectType::Resource,
            ObjectType::Allocation,
            ObjectType::JobTemplate,
            ObjectType::Pool,
            ObjectType::Profile,
        ] {
            assert_eq!(ObjectType::from_i32(ty.as_i32()), Some(ty));
        }
        assert_eq!(ObjectType::from_i32(0), None);
    }
}
