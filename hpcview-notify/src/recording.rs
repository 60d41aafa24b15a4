//! Controller that records every callback, for tests.

use crate::controller::{Controller, EventBatch, RemoteControlService};
use hpcview_core::error::TransportError;
use hpcview_wire::{EntityKind, ObjectEvent, RowsetChange};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Object(ObjectEvent),
    RowsetChange(RowsetChange),
    Connected(i32),
}

/// Records callbacks in arrival order. Polls are forwarded to an optional
/// control service; without one they return empty batches.
#[derive(Default)]
pub struct RecordingController {
    events: Mutex<Vec<Recorded>>,
    register_requests: AtomicUsize,
    control: Option<Arc<dyn RemoteControlService>>,
}

impl RecordingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_control(control: Arc<dyn RemoteControlService>) -> Self {
        Self {
            control: Some(control),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn object_events(&self, kind: EntityKind) -> Vec<ObjectEvent> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Object(event) if event.kind == kind => Some(event.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn rowset_changes(&self) -> Vec<RowsetChange> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::RowsetChange(change) => Some(change.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connections(&self) -> Vec<i32> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Connected(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    pub fn register_requests(&self) -> usize {
        self.register_requests.load(Ordering::Acquire)
    }

    fn push(&self, event: Recorded) {
        self.events.lock().push(event);
    }
}

impl std::fmt::Debug for RecordingController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingController")
            .field("events", &self.events.lock().len())
            .field("register_requests", &self.register_requests())
            .finish()
    }
}

impl Controller for RecordingController {
    fn on_job_event(&self, event: &ObjectEvent) {
        self.push(Recorded::Object(event.clone()));
    }

    fn on_task_event(&self, event: &ObjectEvent) {
        self.push(Recorded::Object(event.clone()));
    }

    fn on_resource_event(&self, event: &ObjectEvent) {
        self.push(Recorded::Object(event.clone()));
    }

    fn on_node_event(&self, event: &ObjectEvent) {
        self.push(Recorded::Object(event.clone()));
    }

    fn on_profile_event(&self, event: &ObjectEvent) {
        self.push(Recorded::Object(event.clone()));
    }

    fn on_rowset_change(&self, change: RowsetChange) {
        self.push(Recorded::RowsetChange(change));
    }

    fn on_connected(&self, connection_id: i32) {
        self.push(Recorded::Connected(connection_id));
    }

    fn request_register_events(&self) {
        self.register_requests.fetch_add(1, Ordering::AcqRel);
    }

    fn get_event_data(&self, connection_id: i32, since: u64) -> Result<EventBatch, TransportError> {
        match &self.control {
            Some(control) => control.get_event_data(connection_id, since),
            None => Ok(EventBatch {
                buffers: Vec::new(),
                next: since,
            }),
        }
    }
}
