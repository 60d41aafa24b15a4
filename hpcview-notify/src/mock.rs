//! In-memory control service for tests.

use crate::controller::{EventBatch, RemoteControlService};
use hpcview_core::error::TransportError;
use hpcview_core::value::ObjectType;
use hpcview_core::version::ServerVersion;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

/// One register or unregister call, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationCall {
    Register {
        connection_id: i32,
        object_type: ObjectType,
    },
    Unregister {
        connection_id: i32,
        object_type: ObjectType,
    },
}

#[derive(Debug)]
pub struct MockControlService {
    version: Mutex<ServerVersion>,
    poll_client_id: AtomicI32,
    registrations: Mutex<Vec<RegistrationCall>>,
    queued: Mutex<VecDeque<Vec<u8>>>,
    cursor: Mutex<u64>,
    polls: AtomicUsize,
    failing_polls: AtomicUsize,
}

impl Default for MockControlService {
    fn default() -> Self {
        Self {
            version: Mutex::new(ServerVersion::current()),
            poll_client_id: AtomicI32::new(7),
            registrations: Mutex::new(Vec::new()),
            queued: Mutex::new(VecDeque::new()),
            cursor: Mutex::new(0),
            polls: AtomicUsize::new(0),
            failing_polls: AtomicUsize::new(0),
        }
    }
}

impl MockControlService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(version: ServerVersion) -> Self {
        let mock = Self::default();
        *mock.version.lock() = version;
        mock
    }

    pub fn set_poll_client_id(&self, id: i32) {
        self.poll_client_id.store(id, Ordering::Release);
    }

    /// Queue an encoded buffer for the next poll.
    pub fn queue_buffer(&self, bytes: Vec<u8>) {
        self.queued.lock().push_back(bytes);
    }

    /// Fail the next `n` polls with an I/O error.
    pub fn fail_next_polls(&self, n: usize) {
        self.failing_polls.store(n, Ordering::Release);
    }

    pub fn registrations(&self) -> Vec<RegistrationCall> {
        self.registrations.lock().clone()
    }

    /// Object types registered for `connection_id`, in call order.
    pub fn registered_types(&self, connection_id: i32) -> Vec<ObjectType> {
        self.registrations
            .lock()
            .iter()
            .filter_map(|call| match *call {
                RegistrationCall::Register {
                    connection_id: conn,
                    object_type,
                } if conn == connection_id => Some(object_type),
                _ => None,
            })
            .collect()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::Acquire)
    }
}

impl RemoteControlService for MockControlService {
    fn server_version(&self) -> Result<ServerVersion, TransportError> {
        Ok(*self.version.lock())
    }

    fn register_poll_client(&self) -> Result<i32, TransportError> {
        Ok(self.poll_client_id.load(Ordering::Acquire))
    }

    fn register_events(&self, connection_id: i32, object_type: ObjectType) -> Result<(), TransportError> {
        self.registrations.lock().push(RegistrationCall::Register {
            connection_id,
            object_type,
        });
        Ok(())
    }

    fn unregister_events(
        &self,
        connection_id: i32,
        object_type: ObjectType,
    ) -> Result<(), TransportError> {
        self.registrations.lock().push(RegistrationCall::Unregister {
            connection_id,
            object_type,
        });
        Ok(())
    }

    fn get_event_data(&self, _connection_id: i32, since: u64) -> Result<EventBatch, TransportError> {
        self.polls.fetch_add(1, Ordering::AcqRel);
        let failing = self.failing_polls.load(Ordering::Acquire);
        if failing > 0 {
            self.failing_polls.store(failing - 1, Ordering::Release);
            return Err(TransportError::Io {
                reason: "poll refused".to_string(),
            });
        }
        let buffers: Vec<Vec<u8>> = self.queued.lock().drain(..).collect();
        let mut cursor = self.cursor.lock();
        *cursor = (*cursor).max(since) + buffers.len() as u64;
        Ok(EventBatch {
            buffers,
            next: *cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_drains_queue_and_advances_cursor() {
        let mock = MockControlService::new();
        mock.queue_buffer(vec![2, 0, 0, 0]);
        mock.queue_buffer(vec![2, 0, 0, 0]);

        let first = mock.get_event_data(7, 0).unwrap();
        assert_eq!(first.buffers.len(), 2);
        assert_eq!(first.next, 2);

        let second = mock.get_event_data(7, first.next).unwrap();
        assert!(second.buffers.is_empty());
        assert_eq!(second.next, 2);
        assert_eq!(mock.poll_count(), 2);
    }

    #[test]
    fn test_injected_poll_failures() {
        let mock = MockControlService::new();
        mock.fail_next_polls(1);
        assert!(mock.get_event_data(7, 0).is_err());
        assert!(mock.get_event_data(7, 0).is_ok());
    }
}
