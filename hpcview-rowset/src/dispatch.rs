//! Rowset dispatch table.
//!
//! The notification thread and caller threads meet here: callers register
//! and unregister Dynamic rowsets by server id, the notification thread
//! routes rowset-change packets to them. Each rowset publishes a
//! [`RowsetSink`] holding the state a push update touches, so dispatch never
//! waits on the rowset's own reader/writer lock.

use hpcview_compat::ConversionMap;
use hpcview_core::query::EventType;
use hpcview_core::row::PropertyRow;
use hpcview_core::value::ObjectType;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

// ============================================================================
// CHANGE EVENTS
// ============================================================================

/// One pushed change for a rowset.
#[derive(Debug, Clone, PartialEq)]
pub struct RowsetChangeEvent {
    pub rowset_id: i32,
    pub row_count: i32,
    pub object_index: i32,
    pub prev_index: i32,
    pub object_id: i32,
    pub event_type: EventType,
    pub properties: PropertyRow,
}

/// Handle returned by [`RowsetSink::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub type ChangeHandler = Arc<dyn Fn(&RowsetChangeEvent) + Send + Sync>;

// ============================================================================
// SINK
// ============================================================================

/// Push-side state of one rowset.
pub struct RowsetSink {
    object_type: ObjectType,
    rowset_id: AtomicI32,
    row_count: AtomicI32,
    position: AtomicI32,
    /// Object id -> row index, from fetched pages and pushed changes.
    object_index: Mutex<HashMap<i32, i32>>,
    conversion: RwLock<Option<Arc<ConversionMap>>>,
    handlers: Mutex<Vec<(HandlerId, ChangeHandler)>>,
    next_handler: AtomicU64,
}

impl fmt::Debug for RowsetSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowsetSink")
            .field("object_type", &self.object_type)
            .field("rowset_id", &self.rowset_id())
            .field("row_count", &self.row_count())
            .field("position", &self.position())
            .field("handlers", &self.handlers.lock().len())
            .finish()
    }
}

impl RowsetSink {
    pub fn new(object_type: ObjectType) -> Self {
        Self {
            object_type,
            rowset_id: AtomicI32::new(-1),
            row_count: AtomicI32::new(0),
            position: AtomicI32::new(0),
            object_index: Mutex::new(HashMap::new()),
            conversion: RwLock::new(None),
            handlers: Mutex::new(Vec::new()),
            next_handler: AtomicU64::new(1),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn rowset_id(&self) -> i32 {
        self.rowset_id.load(Ordering::Acquire)
    }

    pub fn set_rowset_id(&self, id: i32) {
        self.rowset_id.store(id, Ordering::Release);
    }

    pub fn row_count(&self) -> i32 {
        self.row_count.load(Ordering::Acquire)
    }

    pub fn set_row_count(&self, count: i32) {
        self.row_count.store(count.max(0), Ordering::Release);
    }

    pub fn position(&self) -> i32 {
        self.position.load(Ordering::Acquire)
    }

    pub fn set_position(&self, position: i32) {
        self.position.store(position.max(0), Ordering::Release);
    }

    /// Conversion map applied to pushed properties.
    pub fn set_conversion(&self, map: Option<Arc<ConversionMap>>) {
        *self.conversion.write() = map.filter(|m| !m.is_identity());
    }

    pub fn object_index(&self, object_id: i32) -> Option<i32> {
        self.object_index.lock().get(&object_id).copied()
    }

    /// Record the object ids of a fetched page starting at `first_row`.
    pub fn record_page(&self, first_row: i32, object_ids: impl IntoIterator<Item = Option<i32>>) {
        let mut index = self.object_index.lock();
        for (offset, id) in object_ids.into_iter().enumerate() {
            if let Some(id) = id {
                index.insert(id, first_row + offset as i32);
            }
        }
    }

    pub fn clear_index(&self) {
        self.object_index.lock().clear();
    }

    pub fn subscribe<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&RowsetChangeEvent) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::Relaxed));
        self.handlers.lock().push((id, Arc::new(handler)));
        id
    }

    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Apply a pushed change and run the change handlers.
    pub fn apply(&self, mut event: RowsetChangeEvent) {
        self.set_row_count(event.row_count);
        self.track_membership(&event);

        if let Some(map) = self.conversion.read().as_ref() {
            event.properties = map.restore_row(&event.properties, true);
        }

        // Handlers run without any sink lock held so they may call back in.
        let handlers: Vec<ChangeHandler> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(&event);
        }
    }

    /// Indices come straight off the wire; ones outside the rowset are
    /// logged and skipped so a bad packet cannot corrupt the index map.
    fn track_membership(&self, event: &RowsetChangeEvent) {
        let count = event.row_count.max(0);
        let in_rows = |i: i32| (0..count).contains(&i);
        let mut index = self.object_index.lock();
        let position = self.position();
        match event.event_type {
            EventType::Insert | EventType::Create if in_rows(event.object_index) => {
                shift(&mut index, event.object_index, 1);
                index.insert(event.object_id, event.object_index);
                if event.object_index <= position && position.saturating_add(1) < count {
                    self.set_position(position + 1);
                }
            }
            EventType::Delete => {
                let removed = index
                    .remove(&event.object_id)
                    .or_else(|| (event.prev_index >= 0).then_some(event.prev_index))
                    .unwrap_or(event.object_index);
                // The count is taken after the delete, so the last row's index equals it.
                if (0..=count).contains(&removed) {
                    shift(&mut index, removed.saturating_add(1), -1);
                    if removed < position {
                        self.set_position(position - 1);
                    }
                } else {
                    skip_out_of_range(event);
                }
            }
            EventType::Modify | EventType::StateChange
                if in_rows(event.object_index) && event.prev_index < count =>
            {
                if event.prev_index >= 0 && event.prev_index != event.object_index {
                    index.remove(&event.object_id);
                    shift(&mut index, event.prev_index + 1, -1);
                    shift(&mut index, event.object_index, 1);
                }
                index.insert(event.object_id, event.object_index);
            }
            EventType::Insert | EventType::Create | EventType::Modify | EventType::StateChange => {
                skip_out_of_range(event);
            }
            EventType::Reset => {
                index.clear();
                self.set_position(0);
            }
            EventType::Other(code) => {
                trace!(rowset_id = event.rowset_id, code, "unrecognized rowset event");
            }
        }
        let max = (count - 1).max(0);
        if self.position() > max {
            self.set_position(max);
        }
    }
}

fn skip_out_of_range(event: &RowsetChangeEvent) {
    trace!(
        rowset_id = event.rowset_id,
        object_id = event.object_id,
        object_index = event.object_index,
        prev_index = event.prev_index,
        row_count = event.row_count,
        "rowset change index out of range ignored"
    );
}

fn shift(index: &mut HashMap<i32, i32>, from: i32, delta: i32) {
    for row in index.values_mut() {
        if *row >= from {
            *row = row.saturating_add(delta);
        }
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Rowset id -> sink. Entries are strong and removed explicitly on close.
#[derive(Debug, Default)]
pub struct RowsetRegistry {
    sinks: Mutex<HashMap<i32, Arc<RowsetSink>>>,
}

impl RowsetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, rowset_id: i32, sink: Arc<RowsetSink>) {
        debug!(rowset_id, object_type = %sink.object_type(), "rowset registered for dispatch");
        self.sinks.lock().insert(rowset_id, sink);
    }

    pub fn unregister(&self, rowset_id: i32) -> Option<Arc<RowsetSink>> {
        let removed = self.sinks.lock().remove(&rowset_id);
        if removed.is_some() {
            debug!(rowset_id, "rowset unregistered");
        }
        removed
    }

    pub fn get(&self, rowset_id: i32) -> Option<Arc<RowsetSink>> {
        self.sinks.lock().get(&rowset_id).cloned()
    }

    /// Route a change to its rowset. Returns false when no rowset with that
    /// id is registered.
    pub fn dispatch(&self, event: RowsetChangeEvent) -> bool {
        let Some(sink) = self.get(event.rowset_id) else {
            trace!(rowset_id = event.rowset_id, "change for unknown rowset dropped");
            return false;
        };
        sink.apply(event);
        true
    }

    pub fn rowset_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.sinks.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(event_type: EventType, object_id: i32, object_index: i32, row_count: i32) -> RowsetChangeEvent {
        RowsetChangeEvent {
            rowset_id: 7,
            row_count,
            object_index,
            prev_index: -1,
            object_id,
            event_type,
            properties: PropertyRow::default(),
        }
    }

    #[test]
    fn test_dispatch_updates_count_and_runs_handlers() {
        let registry = RowsetRegistry::new();
        let sink = Arc::new(RowsetSink::new(ObjectType::Job));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        sink.subscribe(move |e| {
            assert_eq!(e.object_id, 42);
            seen.fetch_add(1, Ordering::SeqCst);
        });
        registry.register(7, Arc::clone(&sink));

        assert!(registry.dispatch(event(EventType::Insert, 42, 0, 3)));
        assert_eq!(sink.row_count(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.object_index(42), Some(0));

        assert!(!registry.dispatch(RowsetChangeEvent {
            rowset_id: 8,
            ..event(EventType::Insert, 1, 0, 1)
        }));
    }

    #[test]
    fn test_membership_tracking() {
        let sink = RowsetSink::new(ObjectType::Task);
        sink.record_page(0, [Some(10), Some(11), Some(12)]);

        sink.apply(event(EventType::Insert, 9, 1, 4));
        assert_eq!(sink.object_index(10), Some(0));
        assert_eq!(sink.object_index(9), Some(1));
        assert_eq!(sink.object_index(12), Some(3));

        sink.apply(event(EventType::Delete, 10, 0, 3));
        assert_eq!(sink.object_index(10), None);
        assert_eq!(sink.object_index(9), Some(0));
        assert_eq!(sink.object_index(12), Some(2));

        sink.apply(RowsetChangeEvent {
            prev_index: 2,
            ..event(EventType::Modify, 12, 0, 3)
        });
        assert_eq!(sink.object_index(12), Some(0));
        assert_eq!(sink.object_index(9), Some(1));
        assert_eq!(sink.object_index(11), Some(2));

        sink.apply(event(EventType::Reset, 0, 0, 0));
        assert_eq!(sink.object_index(12), None);
        assert_eq!(sink.row_count(), 0);
    }

    #[test]
    fn test_out_of_range_indices_are_ignored() {
        let sink = RowsetSink::new(ObjectType::Job);
        sink.record_page(0, [Some(1), Some(2)]);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        sink.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        sink.apply(event(EventType::Delete, 5, i32::MAX, 1));
        sink.apply(event(EventType::Delete, 6, i32::MIN, 1));
        sink.apply(event(EventType::Insert, 7, i32::MAX, 2));
        sink.apply(event(EventType::Insert, 8, -3, 2));
        sink.apply(RowsetChangeEvent {
            prev_index: i32::MAX,
            ..event(EventType::Modify, 2, 0, 2)
        });
        sink.apply(event(EventType::Modify, 9, 4, i32::MIN));

        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(sink.object_index(1), Some(0));
        assert_eq!(sink.object_index(2), Some(1));
        assert_eq!(sink.object_index(7), None);
        assert_eq!(sink.object_index(8), None);
        assert_eq!(sink.row_count(), 0);
        assert_eq!(sink.position(), 0);

        // Still tracking normally afterwards.
        sink.apply(event(EventType::Insert, 3, 0, 3));
        assert_eq!(sink.object_index(3), Some(0));
        assert_eq!(sink.object_index(2), Some(2));
    }

    #[test]
    fn test_delete_at_row_count_is_in_range() {
        let sink = RowsetSink::new(ObjectType::Job);
        sink.record_page(0, [Some(1), Some(2), Some(3)]);
        sink.set_position(2);
        sink.apply(RowsetChangeEvent {
            prev_index: 2,
            ..event(EventType::Delete, 30, 2, 2)
        });
        assert_eq!(sink.object_index(2), Some(1));
        assert_eq!(sink.position(), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let sink = RowsetSink::new(ObjectType::Node);
        let id = sink.subscribe(|_| {});
        assert_eq!(sink.handler_count(), 1);
        assert!(sink.unsubscribe(id));
        assert!(!sink.unsubscribe(id));
        assert_eq!(sink.handler_count(), 0);
    }

    #[test]
    fn test_registry_shrinks_to_zero() {
        let registry = RowsetRegistry::new();
        for id in 1..=5 {
            registry.register(id, Arc::new(RowsetSink::new(ObjectType::Job)));
        }
        assert_eq!(registry.rowset_ids(), vec![1, 2, 3, 4, 5]);
        for id in 1..=5 {
            assert!(registry.unregister(id).is_some());
        }
        assert!(registry.is_empty());
    }
}
