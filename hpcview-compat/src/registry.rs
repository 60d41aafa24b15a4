//! Converter rules keyed by client property and server version.

use crate::compat::PropertyCompatibility;
use crate::converter::{ConverterRef, ReadOnlyConverter};
use crate::converters::{BitFlagConverter, RenameConverter, TaskIdConverter};
use hpcview_core::property::PropertyId;
use hpcview_core::version::ServerVersion;
use hpcview_core::well_known;
use std::collections::HashMap;
use std::sync::Arc;

/// Bits of the legacy `Job.Flags` mask.
pub const JOB_FLAG_EXCLUSIVE: i32 = 0x1;
pub const JOB_FLAG_BACKFILL: i32 = 0x2;
pub const JOB_FLAG_FAIL_ON_TASK_FAILURE: i32 = 0x4;

#[derive(Debug, Clone)]
struct ConverterRule {
    /// Applies to servers older than this version.
    applies_below: ServerVersion,
    converter: ConverterRef,
}

/// All known conversion rules; [`for_version`](Self::for_version) picks the
/// ones that apply to a connected server.
#[derive(Debug, Clone, Default)]
pub struct ConverterRegistry {
    rules: HashMap<i32, Vec<ConverterRule>>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rules for the well-known properties.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(
            ServerVersion::V3,
            Arc::new(RenameConverter::new(
                well_known::NODE_DESCRIPTION.clone(),
                well_known::NODE_COMMENT.clone(),
            )),
        );
        registry.register(
            ServerVersion::V3,
            ReadOnlyConverter::wrap(TaskIdConverter::new(
                well_known::TASK_TASK_ID.clone(),
                well_known::TASK_PARENT_JOB_ID.clone(),
                well_known::TASK_JOB_TASK_ID.clone(),
                well_known::TASK_INSTANCE_ID.clone(),
            )),
        );
        registry.register(
            ServerVersion::V3,
            Arc::new(BitFlagConverter::new(
                well_known::JOB_IS_EXCLUSIVE.clone(),
                well_known::JOB_FLAGS.clone(),
                JOB_FLAG_EXCLUSIVE,
            )),
        );
        registry.register(
            ServerVersion::V3,
            ReadOnlyConverter::wrap(BitFlagConverter::new(
                well_known::JOB_IS_BACKFILL.clone(),
                well_known::JOB_FLAGS.clone(),
                JOB_FLAG_BACKFILL,
            )),
        );
        registry.register(
            ServerVersion::V3,
            Arc::new(BitFlagConverter::new(
                well_known::JOB_FAIL_ON_TASK_FAILURE.clone(),
                well_known::JOB_FLAGS.clone(),
                JOB_FLAG_FAIL_ON_TASK_FAILURE,
            )),
        );
        registry
    }

    /// Add a rule used when the server is older than `applies_below`.
    pub fn register(&mut self, applies_below: ServerVersion, converter: ConverterRef) {
        let uid = converter.client_property().unique_id();
        let rules = self.rules.entry(uid).or_default();
        rules.push(ConverterRule {
            applies_below,
            converter,
        });
        rules.sort_by_key(|r| r.applies_below);
    }

    /// The rule for `client` on `version`: the one with the lowest threshold
    /// still above the server version.
    pub fn select(&self, client: &PropertyId, version: ServerVersion) -> Option<ConverterRef> {
        self.rules
            .get(&client.unique_id())?
            .iter()
            .find(|r| version < r.applies_below)
            .map(|r| Arc::clone(&r.converter))
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Conversion context for a connected server.
    pub fn for_version(&self, version: ServerVersion) -> PropertyCompatibility {
        let converters = self
            .rules
            .values()
            .filter_map(|rules| rules.iter().find(|r| version < r.applies_below))
            .map(|r| {
                (
                    r.converter.client_property().unique_id(),
                    Arc::clone(&r.converter),
                )
            })
            .collect();
        PropertyCompatibility::new(version, converters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_rules_apply_to_old_servers_only() {
        let registry = ConverterRegistry::standard();
        assert_eq!(registry.len(), 5);
        assert!(registry
            .select(&well_known::NODE_DESCRIPTION, ServerVersion::V2)
            .is_some());
        assert!(registry
            .select(&well_known::NODE_DESCRIPTION, ServerVersion::V3)
            .is_none());
        assert!(registry.select(&well_known::JOB_NAME, ServerVersion::V2).is_none());
    }

    #[test]
    fn test_lowest_matching_threshold_wins() {
        let mut registry = ConverterRegistry::new();
        let old = Arc::new(RenameConverter::new(
            well_known::NODE_DESCRIPTION.clone(),
            well_known::NODE_COMMENT.clone(),
        ));
        let newer = Arc::new(RenameConverter::new(
            well_known::NODE_DESCRIPTION.clone(),
            well_known::NODE_NAME.clone(),
        ));
        registry.register(ServerVersion::V3_SP1, newer);
        registry.register(ServerVersion::V3, old);

        let picked = registry
            .select(&well_known::NODE_DESCRIPTION, ServerVersion::V2)
            .unwrap();
        assert_eq!(picked.server_properties()[0], *well_known::NODE_COMMENT);
        let picked = registry
            .select(&well_known::NODE_DESCRIPTION, ServerVersion::V3)
            .unwrap();
        assert_eq!(picked.server_properties()[0], *well_known::NODE_NAME);
    }
}
