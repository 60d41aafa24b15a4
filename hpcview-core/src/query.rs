//! Rowset shape and event enumerations shared by the protocol client and the
//! notification channel.

use crate::property::PropertyId;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of rowset opened on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RowSetType {
    /// Fetched once and iterated without server-side updates.
    #[default]
    Snapshot,
    /// Snapshot that also carries custom properties.
    SnapshotWithCustomProps,
    /// Stays open; the server pushes change notifications.
    Dynamic,
}

impl RowSetType {
    pub fn as_i32(&self) -> i32 {
        match self {
            RowSetType::Snapshot => 0,
            RowSetType::SnapshotWithCustomProps => 1,
            RowSetType::Dynamic => 2,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, RowSetType::Dynamic)
    }
}

bitflags! {
    /// Options passed through to the remote open call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
    pub struct RowsetOptions: u32 {
        /// Expand parametric sweep tasks into their instances.
        const EXPAND_PARAMETRIC = 0x0001;
        /// Include tasks that were cancelled before they started.
        const INCLUDE_CANCELED = 0x0002;
        /// Rows are grouped; row count is the number of groups.
        const GROUPED = 0x0004;
    }
}

/// Aggregate function applied to a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Min,
    Max,
    Average,
}

/// One aggregate output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateColumn {
    pub property: PropertyId,
    pub function: AggregateFunction,
}

impl AggregateColumn {
    pub fn new(property: PropertyId, function: AggregateFunction) -> Self {
        Self { property, function }
    }
}

/// Origin for cursor repositioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeekOrigin {
    /// Absolute offset from row 0.
    Begin,
    /// Relative to the current position.
    Current,
    /// Absolute offset counted back from the last row.
    End,
}

/// Event type carried by object events and rowset-change packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Create,
    Modify,
    Delete,
    StateChange,
    /// Rowset membership: row inserted.
    Insert,
    /// Rowset membership: rowset contents replaced wholesale.
    Reset,
    /// Unrecognized value, preserved so packets re-encode identically.
    Other(i32),
}

impl EventType {
    /// Object event encoding (`1 Create, 2 Modify, 3 Delete, 4 StateChange`).
    pub fn object_code(&self) -> i32 {
        match self {
            EventType::Create | EventType::Insert => 1,
            EventType::Modify => 2,
            EventType::Delete => 3,
            EventType::StateChange | EventType::Reset => 4,
            EventType::Other(code) => *code,
        }
    }

    pub fn from_object_code(code: i32) -> Self {
        match code {
            1 => EventType::Create,
            2 => EventType::Modify,
            3 => EventType::Delete,
            4 => EventType::StateChange,
            other => EventType::Other(other),
        }
    }

    /// Rowset event encoding (`1 Insert, 2 Delete, 3 Modify, 4 Reset`).
    pub fn rowset_code(&self) -> i32 {
        match self {
            EventType::Insert | EventType::Create => 1,
            EventType::Delete => 2,
            EventType::Modify | EventType::StateChange => 3,
            EventType::Reset => 4,
            EventType::Other(code) => *code,
        }
    }

    pub fn from_rowset_code(code: i32) -> Self {
        match code {
            1 => EventType::Insert,
            2 => EventType::Delete,
            3 => EventType::Modify,
            4 => EventType::Reset,
            other => EventType::Other(other),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Other(code) => write!(f, "Other({})", code),
            other => write!(f, "{:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_codes_round_trip() {
        for code in 1..=4 {
            assert_eq!(EventType::from_object_code(code).object_code(), code);
            assert_eq!(EventType::from_rowset_code(code).rowset_code(), code);
        }
        assert_eq!(EventType::from_rowset_code(77), EventType::Other(77));
        assert_eq!(EventType::Other(77).rowset_code(), 77);
    }

    #[test]
    fn test_rowset_type_dynamic() {
        assert!(RowSetType::Dynamic.is_dynamic());
        assert!(!RowSetType::SnapshotWithCustomProps.is_dynamic());
        assert_eq!(RowSetType::default(), RowSetType::Snapshot);
    }
}
