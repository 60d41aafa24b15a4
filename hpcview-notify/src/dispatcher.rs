//! Controller that routes packets to typed handlers and open rowsets.

use crate::controller::{Controller, EventBatch, RemoteControlService};
use hpcview_core::error::TransportError;
use hpcview_core::row::PropertyRow;
use hpcview_core::value::ObjectType;
use hpcview_rowset::{RowsetChangeEvent, RowsetRegistry};
use hpcview_wire::{EntityKind, ObjectEvent, RowsetChange};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

pub type ObjectEventHandler = Arc<dyn Fn(&ObjectEvent) + Send + Sync>;

/// Handle returned by [`EventDispatcher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    handler: ObjectEventHandler,
}

/// Dispatch side of one scheduler connection.
pub struct EventDispatcher {
    registry: Arc<RowsetRegistry>,
    control: Arc<dyn RemoteControlService>,
    connection_id: AtomicI32,
    handlers: Mutex<HashMap<EntityKind, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("connection_id", &self.connection_id())
            .field("rowsets", &self.registry.len())
            .field("subscribed", &self.subscribed_types())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new(registry: Arc<RowsetRegistry>, control: Arc<dyn RemoteControlService>) -> Self {
        Self {
            registry,
            control,
            connection_id: AtomicI32::new(-1),
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &Arc<RowsetRegistry> {
        &self.registry
    }

    /// -1 until the first handshake.
    pub fn connection_id(&self) -> i32 {
        self.connection_id.load(Ordering::Acquire)
    }

    pub fn set_connection_id(&self, id: i32) {
        self.connection_id.store(id, Ordering::Release);
    }

    /// Register a handler for events of one entity kind. The first handler
    /// for a kind subscribes to its events on the server.
    pub fn subscribe<F>(&self, kind: EntityKind, handler: F) -> SubscriptionId
    where
        F: Fn(&ObjectEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let first = {
            let mut handlers = self.handlers.lock();
            let list = handlers.entry(kind).or_default();
            list.push(Subscription {
                id,
                handler: Arc::new(handler),
            });
            list.len() == 1
        };
        if first {
            self.register_with_server(kind.object_type());
        }
        id
    }

    /// Remove a handler; the last one for a kind unsubscribes on the server.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let emptied = {
            let mut handlers = self.handlers.lock();
            let mut emptied = None;
            let mut found = false;
            for (kind, list) in handlers.iter_mut() {
                let before = list.len();
                list.retain(|s| s.id != id);
                if list.len() != before {
                    found = true;
                    if list.is_empty() {
                        emptied = Some(*kind);
                    }
                    break;
                }
            }
            if let Some(kind) = emptied {
                handlers.remove(&kind);
            }
            if !found {
                return false;
            }
            emptied
        };
        if let Some(kind) = emptied {
            let conn = self.connection_id();
            if conn >= 0 {
                if let Err(e) = self.control.unregister_events(conn, kind.object_type()) {
                    debug!(error = %e, object_type = %kind.object_type(), "ignoring unregister failure");
                }
            }
        }
        true
    }

    /// Object types with at least one handler.
    pub fn subscribed_types(&self) -> Vec<ObjectType> {
        self.handlers
            .lock()
            .keys()
            .map(|kind| kind.object_type())
            .collect()
    }

    fn register_with_server(&self, object_type: ObjectType) {
        let conn = self.connection_id();
        if conn < 0 {
            trace!(%object_type, "not connected yet, subscription deferred");
            return;
        }
        match self.control.register_events(conn, object_type) {
            Ok(()) => debug!(connection_id = conn, %object_type, "registered for events"),
            Err(e) => warn!(connection_id = conn, %object_type, error = %e, "event registration failed"),
        }
    }

    fn deliver(&self, kind: EntityKind, event: &ObjectEvent) {
        let handlers: Vec<ObjectEventHandler> = self
            .handlers
            .lock()
            .get(&kind)
            .map(|list| list.iter().map(|s| Arc::clone(&s.handler)).collect())
            .unwrap_or_default();
        trace!(?kind, object_id = event.object_id, handlers = handlers.len(), "object event");
        for handler in handlers {
            handler(event);
        }
    }
}

impl Controller for EventDispatcher {
    fn on_job_event(&self, event: &ObjectEvent) {
        self.deliver(EntityKind::Job, event);
    }

    fn on_task_event(&self, event: &ObjectEvent) {
        self.deliver(EntityKind::Task, event);
    }

    fn on_resource_event(&self, event: &ObjectEvent) {
        self.deliver(EntityKind::Resource, event);
    }

    fn on_node_event(&self, event: &ObjectEvent) {
        self.deliver(EntityKind::Node, event);
    }

    fn on_profile_event(&self, event: &ObjectEvent) {
        self.deliver(EntityKind::Profile, event);
    }

    fn on_rowset_change(&self, change: RowsetChange) {
        let event = RowsetChangeEvent {
            rowset_id: change.rowset_id,
            row_count: change.row_count,
            object_index: change.object_index,
            prev_index: change.prev_index,
            object_id: change.object_id,
            event_type: change.event_type,
            properties: PropertyRow::new(change.properties),
        };
        self.registry.dispatch(event);
    }

    /// Subscriptions made before the first handshake are sent now; later
    /// handshakes go through `request_register_events`.
    fn on_connected(&self, connection_id: i32) {
        let previous = self.connection_id.swap(connection_id, Ordering::AcqRel);
        if previous < 0 {
            for object_type in self.subscribed_types() {
                self.register_with_server(object_type);
            }
        }
    }

    fn request_register_events(&self) {
        let types = self.subscribed_types();
        debug!(connection_id = self.connection_id(), count = types.len(), "re-issuing event subscriptions");
        for object_type in types {
            self.register_with_server(object_type);
        }
    }

    fn get_event_data(&self, connection_id: i32, since: u64) -> Result<EventBatch, TransportError> {
        self.control.get_event_data(connection_id, since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockControlService, RegistrationCall};
    use hpcview_core::query::EventType;
    use hpcview_core::row::StoreProperty;
    use hpcview_core::value::PropertyValue;
    use hpcview_core::well_known;
    use hpcview_rowset::RowsetSink;
    use std::sync::atomic::AtomicUsize;

    fn dispatcher() -> (EventDispatcher, Arc<MockControlService>) {
        let control = Arc::new(MockControlService::new());
        let dispatcher = EventDispatcher::new(Arc::new(RowsetRegistry::new()), control.clone());
        (dispatcher, control)
    }

    fn job_event(id: i32) -> ObjectEvent {
        ObjectEvent {
            kind: EntityKind::Job,
            object_id: id,
            parent_id: -1,
            event_type: EventType::Modify,
            properties: vec![StoreProperty {
                id: well_known::JOB_ID.clone(),
                value: Some(PropertyValue::Int32(id)),
            }],
        }
    }

    #[test]
    fn test_subscription_deferred_until_connected() {
        let (dispatcher, control) = dispatcher();
        dispatcher.subscribe(EntityKind::Job, |_| {});
        dispatcher.subscribe(EntityKind::Job, |_| {});
        assert!(control.registrations().is_empty());

        dispatcher.on_connected(12);
        assert_eq!(control.registered_types(12), vec![ObjectType::Job]);

        // A later reconnect goes through request_register_events.
        dispatcher.on_connected(13);
        assert!(control.registered_types(13).is_empty());
        dispatcher.request_register_events();
        assert_eq!(control.registered_types(13), vec![ObjectType::Job]);
    }

    #[test]
    fn test_last_unsubscribe_unregisters() {
        let (dispatcher, control) = dispatcher();
        dispatcher.on_connected(3);
        let a = dispatcher.subscribe(EntityKind::Node, |_| {});
        let b = dispatcher.subscribe(EntityKind::Node, |_| {});
        assert!(dispatcher.unsubscribe(a));
        assert_eq!(control.registrations().len(), 1);
        assert!(dispatcher.unsubscribe(b));
        assert!(!dispatcher.unsubscribe(b));
        assert_eq!(
            control.registrations().last(),
            Some(&RegistrationCall::Unregister {
                connection_id: 3,
                object_type: ObjectType::Node,
            })
        );
        assert!(dispatcher.subscribed_types().is_empty());
    }

    #[test]
    fn test_events_reach_matching_handlers_only() {
        let (dispatcher, _control) = dispatcher();
        let jobs = Arc::new(AtomicUsize::new(0));
        let tasks = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&jobs);
        dispatcher.subscribe(EntityKind::Job, move |e| {
            assert_eq!(e.object_id, 5);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let seen = Arc::clone(&tasks);
        dispatcher.subscribe(EntityKind::Task, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.on_job_event(&job_event(5));
        assert_eq!(jobs.load(Ordering::SeqCst), 1);
        assert_eq!(tasks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_rowset_change_reaches_registered_sink() {
        let (dispatcher, _control) = dispatcher();
        let sink = Arc::new(RowsetSink::new(ObjectType::Job));
        sink.set_rowset_id(41);
        dispatcher.registry().register(41, Arc::clone(&sink));
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        sink.subscribe(move |event| {
            assert_eq!(event.object_id, 9);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let change = RowsetChange {
            rowset_id: 41,
            object_index: 0,
            prev_index: -1,
            row_count: 1,
            event_type: EventType::Insert,
            object_id: 9,
            properties: Vec::new(),
        };
        dispatcher.on_rowset_change(change.clone());
        dispatcher.on_rowset_change(RowsetChange {
            rowset_id: 42,
            ..change
        });

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(sink.row_count(), 1);
    }
}
