//! Notification channel against a loopback server.

use hpcview_core::config::{NotificationConfig, TransportKind};
use hpcview_core::query::EventType;
use hpcview_notify::{
    ChannelSettings, ChannelState, MockControlService, NotificationChannel, Recorded,
    RecordingController,
};
use hpcview_wire::{encode_packet, EntityKind, Hello, ObjectEvent, Packet, PacketDecoder, RowsetChange};
use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn settings(port: u16) -> ChannelSettings {
    let config = NotificationConfig {
        port,
        transport: TransportKind::Direct,
        reconnect_delay_ms: 50,
        poll_interval_ms: 20,
        connect_timeout_ms: 1_000,
        shutdown_join_timeout_ms: 2_000,
    };
    ChannelSettings::from_config("127.0.0.1", &config)
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(10));
    }
}

/// Accept one client and complete the server side of the handshake.
fn accept_client(listener: &TcpListener, connection_id: i32) -> TcpStream {
    let (mut stream, _) = listener.accept().unwrap();
    let hello = PacketDecoder::well_known().read_packet(&mut stream).unwrap();
    assert_eq!(hello, Packet::client_hello());
    let reply = encode_packet(&Packet::Hello(Hello {
        client_id: connection_id,
        token: None,
    }))
    .unwrap();
    stream.write_all(&reply).unwrap();
    stream
}

fn object(kind: EntityKind, object_id: i32, parent_id: i32) -> Packet {
    Packet::Object(ObjectEvent {
        kind,
        object_id,
        parent_id,
        event_type: EventType::Modify,
        properties: Vec::new(),
    })
}

fn send(stream: &mut TcpStream, packet: &Packet) {
    stream.write_all(&encode_packet(packet).unwrap()).unwrap();
}

#[test]
fn test_direct_channel_routes_events() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let controller = Arc::new(RecordingController::new());
    let channel =
        NotificationChannel::start(settings(port), controller.clone(), PacketDecoder::well_known())
            .unwrap();

    let mut server = accept_client(&listener, 21);
    send(&mut server, &object(EntityKind::Job, 1, -1));
    // Resource without a node never reaches the controller.
    send(&mut server, &object(EntityKind::Resource, 2, -1));
    send(&mut server, &object(EntityKind::Resource, 3, 8));
    send(&mut server, &Packet::KeepAlive);
    let tunneled = encode_packet(&object(EntityKind::Node, 4, -1)).unwrap();
    send(&mut server, &Packet::LegacyTunnel(tunneled));
    send(
        &mut server,
        &Packet::RowsetChange(RowsetChange {
            rowset_id: 9,
            object_index: 0,
            prev_index: -1,
            row_count: 1,
            event_type: EventType::Insert,
            object_id: 1,
            properties: Vec::new(),
        }),
    );

    wait_until("rowset change", || !controller.rowset_changes().is_empty());
    assert_eq!(channel.connection_id(), 21);
    assert_eq!(channel.state(), ChannelState::Listening);
    assert_eq!(controller.connections(), vec![21]);
    assert_eq!(controller.register_requests(), 0);

    let resources = controller.object_events(EntityKind::Resource);
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].object_id, 3);
    assert_eq!(controller.object_events(EntityKind::Node)[0].object_id, 4);

    let order: Vec<i32> = controller
        .events()
        .into_iter()
        .filter_map(|e| match e {
            Recorded::Object(event) => Some(event.object_id),
            _ => None,
        })
        .collect();
    assert_eq!(order, vec![1, 3, 4]);

    assert!(channel.shutdown());
    assert_eq!(channel.state(), ChannelState::Stopped);
}

#[test]
fn test_reconnect_reregisters_once() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let controller = Arc::new(RecordingController::new());
    let channel =
        NotificationChannel::start(settings(port), controller.clone(), PacketDecoder::well_known())
            .unwrap();

    let first = accept_client(&listener, 21);
    wait_until("first handshake", || controller.connections() == vec![21]);
    drop(first);

    let _second = accept_client(&listener, 22);
    wait_until("second handshake", || controller.connections() == vec![21, 22]);
    assert_eq!(controller.register_requests(), 1);
    assert_eq!(channel.handshakes(), 2);
    assert_eq!(channel.connection_id(), 22);

    assert!(channel.shutdown());
}

#[test]
fn test_poll_transport_decodes_tunnels() {
    let control = Arc::new(MockControlService::new());
    let controller = Arc::new(RecordingController::with_control(control.clone()));

    let mut buffer = encode_packet(&object(EntityKind::Job, 5, -1)).unwrap();
    let inner = encode_packet(&object(EntityKind::Task, 6, 5)).unwrap();
    buffer.extend(encode_packet(&Packet::LegacyTunnel(inner)).unwrap());
    control.queue_buffer(buffer);
    // Garbage is skipped without dropping the connection.
    control.queue_buffer(vec![0x7f, 0, 0, 0]);

    let mut settings = settings(0).with_poll_connection_id(7);
    settings.transport = TransportKind::Poll;
    let channel =
        NotificationChannel::start(settings, controller.clone(), PacketDecoder::well_known())
            .unwrap();

    wait_until("task event", || !controller.object_events(EntityKind::Task).is_empty());
    assert_eq!(controller.connections(), vec![7]);
    assert_eq!(controller.object_events(EntityKind::Job)[0].object_id, 5);
    assert_eq!(controller.object_events(EntityKind::Task)[0].parent_id, 5);

    control.queue_buffer(encode_packet(&object(EntityKind::Node, 11, -1)).unwrap());
    wait_until("node event", || !controller.object_events(EntityKind::Node).is_empty());
    assert_eq!(controller.connections(), vec![7]);

    assert!(channel.shutdown());
}

#[test]
fn test_poll_failure_reconnects() {
    let control = Arc::new(MockControlService::new());
    control.fail_next_polls(1);
    let controller = Arc::new(RecordingController::with_control(control.clone()));

    let mut settings = settings(0).with_poll_connection_id(7);
    settings.transport = TransportKind::Poll;
    let channel =
        NotificationChannel::start(settings, controller.clone(), PacketDecoder::well_known())
            .unwrap();

    wait_until("second registration", || controller.connections().len() == 2);
    assert_eq!(controller.register_requests(), 1);
    assert!(channel.shutdown());
}

#[test]
fn test_shutdown_interrupts_blocked_read() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let controller = Arc::new(RecordingController::new());
    let channel =
        NotificationChannel::start(settings(port), controller.clone(), PacketDecoder::well_known())
            .unwrap();

    let _server = accept_client(&listener, 30);
    wait_until("listening", || channel.state() == ChannelState::Listening);

    let started = Instant::now();
    assert!(channel.shutdown());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(channel.state(), ChannelState::Stopped);
    assert!(!channel.is_running());
    // Second call is a no-op.
    assert!(channel.shutdown());
}

#[test]
fn test_shutdown_resets_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let channel = NotificationChannel::start(
        settings(port),
        Arc::new(RecordingController::new()),
        PacketDecoder::well_known(),
    )
    .unwrap();

    let mut server = accept_client(&listener, 31);
    wait_until("listening", || channel.state() == ChannelState::Listening);
    assert!(channel.shutdown());

    server.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = [0u8; 16];
    let err = server.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionReset);
}

#[test]
fn test_shutdown_interrupts_reconnect_delay() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut settings = settings(port);
    settings.reconnect_delay = Duration::from_secs(30);
    let channel = NotificationChannel::start(
        settings,
        Arc::new(RecordingController::new()),
        PacketDecoder::well_known(),
    )
    .unwrap();
    wait_until("disconnected", || channel.state() == ChannelState::Disconnected);

    let started = Instant::now();
    assert!(channel.shutdown());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(channel.state(), ChannelState::Stopped);
}
