//! Change notification channel.
//!
//! One background thread per channel runs the connect/listen loop:
//!
//! ```text
//! Disconnected -> Connecting -> Registered -> Listening
//!      ^                                          |
//!      +------------- transport error ------------+
//! ```
//!
//! Any state moves to `Stopped` once shutdown is requested. Transport
//! errors are logged and followed by a fixed reconnect delay; the thread
//! only exits on shutdown.

use crate::controller::Controller;
use crate::transport::{self, io_error};
use hpcview_core::config::{NotificationConfig, TransportKind};
use hpcview_core::error::TransportError;
use hpcview_wire::{EntityKind, Packet, PacketDecoder};
use parking_lot::{Condvar, Mutex};
use socket2::SockRef;
use std::fmt;
use std::io::BufReader;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    /// Handshake complete.
    Registered,
    /// Blocked in receive or between polls.
    Listening,
    Stopped,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Where and how the channel connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    pub host: String,
    pub port: u16,
    pub transport: TransportKind,
    pub reconnect_delay: Duration,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub join_timeout: Duration,
    /// Connection id obtained out-of-band; required by the poll transport.
    pub poll_connection_id: Option<i32>,
}

impl ChannelSettings {
    pub fn from_config(host: impl Into<String>, config: &NotificationConfig) -> Self {
        Self {
            host: host.into(),
            port: config.port,
            transport: config.transport,
            reconnect_delay: config.reconnect_delay(),
            poll_interval: config.poll_interval(),
            connect_timeout: config.connect_timeout(),
            join_timeout: config.shutdown_join_timeout(),
            poll_connection_id: None,
        }
    }

    pub fn with_poll_connection_id(mut self, id: i32) -> Self {
        self.poll_connection_id = Some(id);
        self
    }
}

// ============================================================================
// SHARED STATE
// ============================================================================

struct Shared {
    running: AtomicBool,
    state: Mutex<ChannelState>,
    /// Clone of the live socket, kept so shutdown can abort a blocked read.
    stream: Mutex<Option<TcpStream>>,
    connection_id: AtomicI32,
    handshakes: AtomicUsize,
    wake: Condvar,
    wake_lock: Mutex<()>,
}

impl Shared {
    fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set_state(&self, next: ChannelState) {
        let mut state = self.state.lock();
        if *state != next {
            trace!(from = %*state, to = %next, "channel state");
            *state = next;
        }
    }

    /// Sleep up to `duration`; returns early on shutdown.
    fn sleep(&self, duration: Duration) {
        let mut guard = self.wake_lock.lock();
        if self.running() {
            self.wake.wait_for(&mut guard, duration);
        }
    }

    fn interrupt(&self) {
        let _guard = self.wake_lock.lock();
        self.wake.notify_all();
    }

    fn attach(&self, stream: &TcpStream) -> Result<(), TransportError> {
        let clone = stream.try_clone().map_err(io_error)?;
        *self.stream.lock() = Some(clone);
        if !self.running() {
            self.abort_stream();
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    /// Abortive close of the current socket. A zero linger makes the final
    /// close send RST instead of FIN; shutting down the read half wakes the
    /// worker's pending read without putting anything on the wire, and the
    /// worker's drop of its handle is that final close. Errors are ignored;
    /// the peer may already be gone.
    fn abort_stream(&self) {
        if let Some(stream) = self.stream.lock().take() {
            if let Err(e) = SockRef::from(&stream).set_linger(Some(Duration::ZERO)) {
                trace!(error = %e, "setting zero linger failed");
            }
            if let Err(e) = stream.shutdown(Shutdown::Read) {
                trace!(error = %e, "socket shutdown failed");
            }
        }
    }
}

// ============================================================================
// CHANNEL
// ============================================================================

pub struct NotificationChannel {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
    done: Mutex<Option<mpsc::Receiver<()>>>,
    join_timeout: Duration,
}

impl fmt::Debug for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationChannel")
            .field("state", &self.state())
            .field("connection_id", &self.connection_id())
            .finish()
    }
}

impl NotificationChannel {
    /// Start the background thread. Returns once the thread is running; the
    /// connection itself is made asynchronously.
    pub fn start(
        settings: ChannelSettings,
        controller: Arc<dyn Controller>,
        decoder: PacketDecoder,
    ) -> Result<Self, TransportError> {
        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            state: Mutex::new(ChannelState::Disconnected),
            stream: Mutex::new(None),
            connection_id: AtomicI32::new(-1),
            handshakes: AtomicUsize::new(0),
            wake: Condvar::new(),
            wake_lock: Mutex::new(()),
        });
        let (done_tx, done_rx) = mpsc::channel();
        let join_timeout = settings.join_timeout;
        let worker = Worker {
            shared: Arc::clone(&shared),
            controller,
            decoder,
            settings,
        };
        let handle = thread::Builder::new()
            .name("hpcview-notify".to_string())
            .spawn(move || {
                worker.run();
                let _ = done_tx.send(());
            })
            .map_err(io_error)?;

        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
            done: Mutex::new(Some(done_rx)),
            join_timeout,
        })
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.lock()
    }

    /// Server-assigned id of the current connection, -1 before the first
    /// handshake.
    pub fn connection_id(&self) -> i32 {
        self.shared.connection_id.load(Ordering::Acquire)
    }

    /// Completed handshakes, reconnects included.
    pub fn handshakes(&self) -> usize {
        self.shared.handshakes.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running()
    }

    /// Stop the channel without waiting on the peer.
    ///
    /// Flips the running flag, aborts the socket, and joins the thread for
    /// at most the configured join timeout. Returns false if the thread did
    /// not finish in time; it is then left detached.
    pub fn shutdown(&self) -> bool {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            info!(connection_id = self.connection_id(), "stopping notification channel");
        }
        self.shared.abort_stream();
        self.shared.interrupt();

        let Some(done) = self.done.lock().take() else {
            return self.thread.lock().is_none();
        };
        match done.recv_timeout(self.join_timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.thread.lock().take() {
                    if handle.join().is_err() {
                        warn!("notification thread panicked");
                    }
                }
                true
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = self.join_timeout.as_millis() as u64, "notification thread did not stop in time");
                self.thread.lock().take();
                false
            }
        }
    }
}

impl Drop for NotificationChannel {
    fn drop(&mut self) {
        if self.shared.running() {
            self.shutdown();
        }
    }
}

// ============================================================================
// WORKER
// ============================================================================

struct Worker {
    shared: Arc<Shared>,
    controller: Arc<dyn Controller>,
    decoder: PacketDecoder,
    settings: ChannelSettings,
}

impl Worker {
    fn run(&self) {
        debug!(host = %self.settings.host, port = self.settings.port, transport = ?self.settings.transport, "notification thread started");
        while self.shared.running() {
            self.shared.set_state(ChannelState::Connecting);
            let result = match self.settings.transport {
                TransportKind::Direct => self.run_direct(),
                TransportKind::Poll => self.run_poll(),
            };
            self.shared.abort_stream();
            if !self.shared.running() {
                break;
            }
            if let Err(e) = result {
                warn!(error = %e, retry_ms = self.settings.reconnect_delay.as_millis() as u64, "notification channel disconnected");
            }
            self.shared.set_state(ChannelState::Disconnected);
            self.shared.sleep(self.settings.reconnect_delay);
        }
        self.shared.set_state(ChannelState::Stopped);
        debug!("notification thread exiting");
    }

    fn registered(&self, connection_id: i32) {
        self.shared.connection_id.store(connection_id, Ordering::Release);
        self.shared.set_state(ChannelState::Registered);
        self.controller.on_connected(connection_id);
        let previous = self.shared.handshakes.fetch_add(1, Ordering::AcqRel);
        if previous > 0 {
            self.controller.request_register_events();
        }
        info!(connection_id, reconnect = previous > 0, "notification channel registered");
    }

    fn run_direct(&self) -> Result<(), TransportError> {
        let mut stream = transport::connect(
            &self.settings.host,
            self.settings.port,
            self.settings.connect_timeout,
        )?;
        self.shared.attach(&stream)?;
        let connection_id = transport::handshake(&mut stream, &self.decoder)?;
        self.registered(connection_id);

        self.shared.set_state(ChannelState::Listening);
        let mut reader = BufReader::new(stream);
        while self.shared.running() {
            let packet = self
                .decoder
                .read_packet(&mut reader)
                .map_err(|e| TransportError::Io {
                    reason: e.to_string(),
                })?;
            route_packet(self.controller.as_ref(), &self.decoder, packet);
        }
        Ok(())
    }

    fn run_poll(&self) -> Result<(), TransportError> {
        let connection_id = self
            .settings
            .poll_connection_id
            .ok_or_else(|| TransportError::Handshake {
                reason: "poll transport needs a connection id".to_string(),
            })?;
        self.registered(connection_id);
        self.shared.set_state(ChannelState::Listening);

        let mut since = 0u64;
        while self.shared.running() {
            let batch = self.controller.get_event_data(connection_id, since)?;
            since = batch.next;
            for buffer in batch.buffers {
                match self.decoder.decode_buffer(&buffer) {
                    Ok(packets) => {
                        for packet in packets {
                            route_packet(self.controller.as_ref(), &self.decoder, packet);
                        }
                    }
                    Err(e) => warn!(error = %e, len = buffer.len(), "dropping undecodable event buffer"),
                }
            }
            self.shared.sleep(self.settings.poll_interval);
        }
        Ok(())
    }
}

/// Hand one decoded packet to the matching controller callback.
///
/// Resource events without a parent node are dropped. Legacy tunnels are
/// decoded and their frames routed in turn.
pub fn route_packet(controller: &dyn Controller, decoder: &PacketDecoder, packet: Packet) {
    match packet {
        Packet::Object(event) => match event.kind {
            EntityKind::Job => controller.on_job_event(&event),
            EntityKind::Task => controller.on_task_event(&event),
            EntityKind::Resource if event.parent_id == -1 => {
                debug!(resource_id = event.object_id, "dropping phantom resource event");
            }
            EntityKind::Resource => controller.on_resource_event(&event),
            EntityKind::Node => controller.on_node_event(&event),
            EntityKind::Profile => controller.on_profile_event(&event),
        },
        Packet::RowsetChange(change) => {
            trace!(rowset_id = change.rowset_id, event = %change.event_type, rows = change.row_count, "rowset change");
            controller.on_rowset_change(change);
        }
        Packet::KeepAlive => trace!("keep-alive"),
        Packet::Hello(hello) => debug!(client_id = hello.client_id, "ignoring Hello after handshake"),
        Packet::LegacyTunnel(bytes) => match decoder.decode_buffer(&bytes) {
            Ok(packets) => {
                for inner in packets {
                    route_packet(controller, decoder, inner);
                }
            }
            Err(e) => warn!(error = %e, len = bytes.len(), "dropping undecodable tunnel"),
        },
    }
}
