//! hpcview Test Utilities
//!
//! Shared test infrastructure for the hpcview workspace:
//! - In-memory rowset and control services, recording controller
//! - Proptest generators for property values and packets
//! - Row fixtures for jobs, tasks and nodes
//! - Tracing setup for tests

// Re-export mocks from their source crates
pub use hpcview_notify::{MockControlService, Recorded, RecordingController, RegistrationCall};
pub use hpcview_rowset::{CallCounts, MockRowsetService};

pub use hpcview_core::{
    ClientConfig, HpcViewError, HpcViewResult, NotificationConfig, ObjectType, PropertyId,
    PropertyRow, PropertyValue, RowsetError, StoreProperty, TransportKind,
};

use hpcview_core::well_known;

/// Install a fmt subscriber filtered by `RUST_LOG`, writing through the
/// test harness. Later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for property values and change packets.

    use super::*;
    use chrono::{DateTime, Utc};
    use hpcview_core::property::PropertyType;
    use hpcview_core::query::EventType;
    use hpcview_core::value::TaskIdentifier;
    use hpcview_wire::datetime::{from_ticks, MAX_TICKS};
    use hpcview_wire::{EntityKind, Hello, ObjectEvent, Packet, RowsetChange};
    use proptest::prelude::*;

    pub fn arb_datetime() -> impl Strategy<Value = DateTime<Utc>> {
        (0..=MAX_TICKS).prop_filter_map("tick out of range", from_ticks)
    }

    /// A value of the given type. Object-typed properties never travel and
    /// get no strategy of their own.
    pub fn arb_value(ty: PropertyType) -> BoxedStrategy<PropertyValue> {
        match ty {
            PropertyType::Int32 => any::<i32>().prop_map(PropertyValue::Int32).boxed(),
            PropertyType::Int64 => any::<i64>().prop_map(PropertyValue::Int64).boxed(),
            PropertyType::UInt32 => any::<u32>().prop_map(PropertyValue::UInt32).boxed(),
            PropertyType::Bool => any::<bool>().prop_map(PropertyValue::Bool).boxed(),
            PropertyType::String => "[a-zA-Z0-9 ._-]{0,16}".prop_map(PropertyValue::String).boxed(),
            PropertyType::StringList => prop::collection::vec("[a-z]{0,8}", 0..4)
                .prop_map(PropertyValue::StringList)
                .boxed(),
            PropertyType::DateTime => arb_datetime().prop_map(PropertyValue::DateTime).boxed(),
            PropertyType::Guid => any::<u128>()
                .prop_map(|v| PropertyValue::Guid(uuid::Uuid::from_u128(v)))
                .boxed(),
            PropertyType::Binary => prop::collection::vec(any::<u8>(), 0..16)
                .prop_map(PropertyValue::Binary)
                .boxed(),
            PropertyType::TaskId => (0..10_000i32, 0..1_000i32, 0..100i32)
                .prop_map(|(job, task, instance)| {
                    PropertyValue::TaskId(TaskIdentifier::new(job, task, instance))
                })
                .boxed(),
            PropertyType::Enum(_) => (0..16i32).prop_map(PropertyValue::Enum).boxed(),
            PropertyType::Object => Just(PropertyValue::Int32(0)).boxed(),
        }
    }

    /// A well-known, non-object property with a value of its type or null.
    pub fn arb_store_property() -> impl Strategy<Value = StoreProperty> {
        let props: Vec<PropertyId> = well_known::all()
            .into_iter()
            .filter(|p| p.value_type() != PropertyType::Object)
            .collect();
        prop::sample::select(props).prop_flat_map(|id| {
            prop::option::of(arb_value(id.value_type())).prop_map(move |value| StoreProperty {
                id: id.clone(),
                value,
            })
        })
    }

    pub fn arb_entity_kind() -> impl Strategy<Value = EntityKind> {
        prop_oneof![
            Just(EntityKind::Job),
            Just(EntityKind::Task),
            Just(EntityKind::Resource),
            Just(EntityKind::Node),
            Just(EntityKind::Profile),
        ]
    }

    pub fn arb_object_event_type() -> impl Strategy<Value = EventType> {
        prop_oneof![
            Just(EventType::Create),
            Just(EventType::Modify),
            Just(EventType::Delete),
            Just(EventType::StateChange),
        ]
    }

    pub fn arb_rowset_event_type() -> impl Strategy<Value = EventType> {
        prop_oneof![
            Just(EventType::Insert),
            Just(EventType::Delete),
            Just(EventType::Modify),
            Just(EventType::Reset),
        ]
    }

    pub fn arb_object_event() -> impl Strategy<Value = ObjectEvent> {
        (
            arb_entity_kind(),
            0..100_000i32,
            -1..1_000i32,
            arb_object_event_type(),
            prop::collection::vec(arb_store_property(), 0..6),
        )
            .prop_map(|(kind, object_id, parent_id, event_type, properties)| ObjectEvent {
                kind,
                object_id,
                parent_id,
                event_type,
                properties,
            })
    }

    pub fn arb_rowset_change() -> impl Strategy<Value = RowsetChange> {
        (
            1..10_000i32,
            -1..500i32,
            -1..500i32,
            0..1_000i32,
            arb_rowset_event_type(),
            0..100_000i32,
            prop::collection::vec(arb_store_property(), 0..6),
        )
            .prop_map(
                |(rowset_id, object_index, prev_index, row_count, event_type, object_id, properties)| {
                    RowsetChange {
                        rowset_id,
                        object_index,
                        prev_index,
                        row_count,
                        event_type,
                        object_id,
                        properties,
                    }
                },
            )
    }

    /// Any packet except legacy tunnels.
    pub fn arb_packet() -> impl Strategy<Value = Packet> {
        prop_oneof![
            (any::<i32>(), prop::option::of("[a-z]{0,8}"))
                .prop_map(|(client_id, token)| Packet::Hello(Hello { client_id, token })),
            Just(Packet::KeepAlive),
            arb_object_event().prop_map(Packet::Object),
            arb_rowset_change().prop_map(Packet::RowsetChange),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Rows and configurations for common scenarios.

    use super::*;
    use std::sync::Arc;

    pub fn prop(id: &PropertyId, value: impl Into<PropertyValue>) -> StoreProperty {
        StoreProperty {
            id: id.clone(),
            value: Some(value.into()),
        }
    }

    pub fn job_row(id: i32, name: &str, owner: &str) -> PropertyRow {
        PropertyRow::indexed(vec![
            prop(&well_known::JOB_ID, id),
            prop(&well_known::JOB_NAME, name),
            prop(&well_known::JOB_OWNER, owner),
            prop(&well_known::JOB_FLAGS, 0),
        ])
    }

    /// Master task row (instance 0).
    pub fn task_row(id: i32, job_id: i32, job_task_id: i32) -> PropertyRow {
        PropertyRow::indexed(vec![
            prop(&well_known::TASK_ID, id),
            prop(&well_known::TASK_PARENT_JOB_ID, job_id),
            prop(&well_known::TASK_JOB_TASK_ID, job_task_id),
            prop(&well_known::TASK_INSTANCE_ID, 0),
            prop(&well_known::TASK_NAME, format!("task-{}", job_task_id)),
        ])
    }

    pub fn node_row(id: i32, name: &str, state: i32) -> PropertyRow {
        PropertyRow::indexed(vec![
            prop(&well_known::NODE_ID, id),
            prop(&well_known::NODE_NAME, name),
            StoreProperty {
                id: well_known::NODE_STATE.clone(),
                value: Some(PropertyValue::Enum(state)),
            },
        ])
    }

    /// Service holding `jobs` jobs named `job-<id>`, ids starting at 1,
    /// owners alternating between alice and bob.
    pub fn service_with_jobs(jobs: i32) -> Arc<MockRowsetService> {
        let service = Arc::new(MockRowsetService::new());
        service.set_rows(
            ObjectType::Job,
            (1..=jobs)
                .map(|id| {
                    let owner = if id % 2 == 0 { "bob" } else { "alice" };
                    job_row(id, &format!("job-{}", id), owner)
                })
                .collect(),
        );
        service
    }

    /// Poll-transport config with short timings, needing no socket.
    pub fn poll_config() -> ClientConfig {
        let mut config = ClientConfig::for_scheduler("head-node");
        config.notification.transport = TransportKind::Poll;
        config.notification.poll_interval_ms = 20;
        config.notification.reconnect_delay_ms = 50;
        config.notification.shutdown_join_timeout_ms = 2_000;
        config
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on hpcview errors.

    use super::*;

    pub fn assert_rowset_error<T: std::fmt::Debug>(result: &HpcViewResult<T>, expected: &RowsetError) {
        match result {
            Err(HpcViewError::Rowset(err)) => assert_eq!(err, expected),
            other => panic!("expected rowset error {:?}, got {:?}", expected, other),
        }
    }

    pub fn assert_stale<T: std::fmt::Debug>(result: &HpcViewResult<T>) {
        assert!(
            matches!(result, Err(HpcViewError::Rowset(RowsetError::StaleRowset { .. }))),
            "expected stale rowset, got {:?}",
            result
        );
    }

    pub fn assert_access_denied<T: std::fmt::Debug>(result: &HpcViewResult<T>) {
        assert!(
            matches!(result, Err(HpcViewError::Rowset(RowsetError::AccessDenied { .. }))),
            "expected access denied, got {:?}",
            result
        );
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::generators::*;
    use super::*;
    use hpcview_wire::{encode_packet, PacketDecoder};
    use proptest::prelude::*;

    #[test]
    fn test_service_with_jobs() {
        let service = service_with_jobs(4);
        assert_eq!(service.row_count(ObjectType::Job), 4);
    }

    #[test]
    fn test_fixture_rows_are_indexed() {
        let row = task_row(10, 2, 1);
        assert!(row.is_indexed());
        assert_eq!(row.value(&well_known::TASK_PARENT_JOB_ID), Some(&PropertyValue::Int32(2)));
    }

    #[test]
    fn test_poll_config_is_valid() {
        assert!(poll_config().validate().is_ok());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_generated_packets_decode(packet in arb_packet()) {
            let bytes = encode_packet(&packet).unwrap();
            let decoded = PacketDecoder::well_known().decode_buffer(&bytes).unwrap();
            prop_assert_eq!(decoded, vec![packet]);
        }
    }
}
