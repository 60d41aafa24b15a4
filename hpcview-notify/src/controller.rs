//! Collaborators of the notification channel.

use hpcview_core::error::TransportError;
use hpcview_core::value::ObjectType;
use hpcview_core::version::ServerVersion;
use hpcview_wire::{ObjectEvent, RowsetChange};

/// Buffered packet bytes returned by a poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    /// Each buffer holds whole frames.
    pub buffers: Vec<Vec<u8>>,
    /// Cursor to pass as `since` on the next poll.
    pub next: u64,
}

/// Receives decoded packets from the channel thread.
///
/// Callbacks run on the channel thread; implementations must not block for
/// long or the stream backs up.
pub trait Controller: Send + Sync {
    fn on_job_event(&self, event: &ObjectEvent);
    fn on_task_event(&self, event: &ObjectEvent);
    fn on_resource_event(&self, event: &ObjectEvent);
    fn on_node_event(&self, event: &ObjectEvent);
    fn on_profile_event(&self, event: &ObjectEvent);
    fn on_rowset_change(&self, change: RowsetChange);

    /// Handshake finished; `connection_id` identifies this client to the
    /// server for subscriptions and polling.
    fn on_connected(&self, _connection_id: i32) {}

    /// Re-issue every outstanding event subscription. Called after each
    /// reconnect except the first connection.
    fn request_register_events(&self);

    /// Poll transport only.
    fn get_event_data(&self, connection_id: i32, since: u64) -> Result<EventBatch, TransportError>;
}

/// Out-of-band control calls made against the scheduler.
pub trait RemoteControlService: Send + Sync {
    fn server_version(&self) -> Result<ServerVersion, TransportError>;

    /// Connection id for a poll-transport client.
    fn register_poll_client(&self) -> Result<i32, TransportError>;

    fn register_events(&self, connection_id: i32, object_type: ObjectType) -> Result<(), TransportError>;

    fn unregister_events(
        &self,
        connection_id: i32,
        object_type: ObjectType,
    ) -> Result<(), TransportError>;

    fn get_event_data(&self, connection_id: i32, since: u64) -> Result<EventBatch, TransportError>;
}
