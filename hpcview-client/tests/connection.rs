//! Scheduler connection over the poll transport and in-memory services.

use hpcview_client::SchedulerConnection;
use hpcview_core::config::ClientConfig;
use hpcview_core::error::{ConfigError, HpcViewError};
use hpcview_core::filter::FilterProperty;
use hpcview_core::query::{EventType, RowSetType};
use hpcview_core::value::ObjectType;
use hpcview_core::version::ServerVersion;
use hpcview_core::well_known;
use hpcview_rowset::{RowsetChangeEvent, RowsetState};
use hpcview_test_utils::fixtures::{job_row, poll_config, prop, service_with_jobs};
use hpcview_test_utils::{init_test_tracing, MockControlService, MockRowsetService};
use hpcview_wire::{encode_packet, EntityKind, ObjectEvent, Packet, RowsetChange};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(10));
    }
}

struct Fixture {
    service: Arc<MockRowsetService>,
    control: Arc<MockControlService>,
    connection: SchedulerConnection,
}

fn connect(jobs: i32, version: ServerVersion) -> Fixture {
    init_test_tracing();
    let service = service_with_jobs(jobs);
    let control = Arc::new(MockControlService::with_version(version));
    let connection =
        SchedulerConnection::connect(poll_config(), service.clone(), control.clone()).unwrap();
    Fixture {
        service,
        control,
        connection,
    }
}

fn job_event(id: i32, owner: &str) -> Vec<u8> {
    encode_packet(&Packet::Object(ObjectEvent {
        kind: EntityKind::Job,
        object_id: id,
        parent_id: -1,
        event_type: EventType::Modify,
        properties: vec![
            prop(&well_known::JOB_ID, id),
            prop(&well_known::JOB_OWNER, owner),
        ],
    }))
    .unwrap()
}

#[test]
fn test_connect_negotiates_version_and_registers_poll_client() {
    let f = connect(0, ServerVersion::V3);
    assert_eq!(f.connection.server_version(), ServerVersion::V3);
    assert_eq!(f.connection.compat().version(), ServerVersion::V3);
    wait_until("poll registration", || f.connection.connection_id() == 7);
    assert!(!f.connection.is_closed());
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = ClientConfig::for_scheduler("head-node");
    config.notification.port = 0;
    let err = SchedulerConnection::connect(
        config,
        Arc::new(MockRowsetService::new()),
        Arc::new(MockControlService::new()),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        HpcViewError::Config(ConfigError::InvalidValue { .. })
    ));
}

#[test]
fn test_config_file_drives_connection() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
scheduler = "head-node"

[notification]
transport = "poll"
poll_interval_ms = 20

[rowset]
page_size = 2
"#
    )
    .unwrap();
    let config = ClientConfig::from_path(file.path()).unwrap();
    let service = service_with_jobs(5);
    let connection =
        SchedulerConnection::connect(config, service.clone(), Arc::new(MockControlService::new()))
            .unwrap();

    let rowset = connection.jobs(RowSetType::Snapshot);
    rowset.set_columns(vec![well_known::JOB_ID.clone()]).unwrap();
    assert_eq!(rowset.iter().count(), 5);
    // 5 rows at 2 per page: three fetches, the last one short.
    assert_eq!(service.calls().get_data, 3);
    connection.shutdown();
}

#[test]
fn test_subscriptions_registered_after_first_poll() {
    let f = connect(0, ServerVersion::current());
    f.connection.subscribe(EntityKind::Job, |_| {});
    f.connection.subscribe(EntityKind::Node, |_| {});
    wait_until("registrations", || {
        let types = f.control.registered_types(7);
        types.contains(&ObjectType::Job) && types.contains(&ObjectType::Node)
    });
    assert!(!f.control.registered_types(7).contains(&ObjectType::Task));
}

#[test]
fn test_filtered_subscription_sees_matching_events_only() {
    let f = connect(0, ServerVersion::current());
    let seen: Arc<Mutex<Vec<i32>>> = Arc::default();
    let all: Arc<Mutex<Vec<i32>>> = Arc::default();

    let sink = Arc::clone(&seen);
    f.connection.subscribe_filtered(
        EntityKind::Job,
        vec![FilterProperty::equal(well_known::JOB_OWNER.clone(), "alice")],
        move |e| sink.lock().unwrap().push(e.object_id),
    );
    let sink = Arc::clone(&all);
    f.connection
        .subscribe(EntityKind::Job, move |e| sink.lock().unwrap().push(e.object_id));

    f.control.queue_buffer(job_event(1, "alice"));
    f.control.queue_buffer(job_event(2, "bob"));
    f.control.queue_buffer(job_event(3, "alice"));

    wait_until("job events", || all.lock().unwrap().len() == 3);
    assert_eq!(*seen.lock().unwrap(), vec![1, 3]);
}

#[test]
fn test_pushed_rowset_change_reaches_dynamic_rowset() {
    let f = connect(2, ServerVersion::current());
    let rowset = f.connection.jobs(RowSetType::Dynamic);
    rowset
        .set_columns(vec![well_known::JOB_ID.clone(), well_known::JOB_NAME.clone()])
        .unwrap();
    assert_eq!(rowset.get_count().unwrap(), 2);
    let rowset_id = rowset.global_id();
    assert_eq!(f.connection.registry().rowset_ids(), vec![rowset_id]);

    let seen: Arc<Mutex<Vec<RowsetChangeEvent>>> = Arc::default();
    let sink = Arc::clone(&seen);
    rowset.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

    f.service.push_row(ObjectType::Job, job_row(3, "job-3", "alice"));
    f.control.queue_buffer(
        encode_packet(&Packet::RowsetChange(RowsetChange {
            rowset_id,
            object_index: 2,
            prev_index: -1,
            row_count: 3,
            event_type: EventType::Insert,
            object_id: 3,
            properties: vec![prop(&well_known::JOB_ID, 3), prop(&well_known::JOB_NAME, "job-3")],
        }))
        .unwrap(),
    );

    wait_until("rowset change", || !seen.lock().unwrap().is_empty());
    assert_eq!(rowset.get_count().unwrap(), 3);
    assert_eq!(rowset.get_object_index(3), Some(2));
    assert_eq!(seen.lock().unwrap()[0].object_id, 3);
}

#[test]
fn test_touch_all_touches_registered_rowsets() {
    let f = connect(3, ServerVersion::current());
    let dynamic = f.connection.jobs(RowSetType::Dynamic);
    let snapshot = f.connection.jobs(RowSetType::Snapshot);
    dynamic.get_count().unwrap();
    snapshot.get_count().unwrap();

    assert_eq!(f.connection.touch_all(), 1);
    assert_eq!(f.service.calls().touch, 1);
}

#[test]
fn test_shutdown_closes_rowsets_and_stops_channel() {
    let f = connect(3, ServerVersion::current());
    let dynamic = f.connection.jobs(RowSetType::Dynamic);
    let snapshot = f.connection.nodes(RowSetType::Snapshot);
    dynamic.get_count().unwrap();
    snapshot.get_count().unwrap();
    assert_eq!(f.connection.open_rowsets().len(), 2);
    assert!(!f.service.open_cursors().is_empty());

    f.connection.shutdown();
    assert!(f.connection.is_closed());
    assert_eq!(dynamic.state(), RowsetState::Closed);
    assert!(f.connection.registry().is_empty());
    assert!(f.service.open_cursors().is_empty());
    assert!(f.connection.open_rowsets().is_empty());

    // Idempotent.
    f.connection.shutdown();
}

#[test]
fn test_open_for_unsupported_type() {
    let f = connect(0, ServerVersion::current());
    assert!(f.connection.open_for(ObjectType::Profile, RowSetType::Snapshot).is_none());
    let rowset = f
        .connection
        .open_for(ObjectType::Node, RowSetType::Snapshot)
        .unwrap();
    assert_eq!(rowset.object_type(), ObjectType::Node);
}
