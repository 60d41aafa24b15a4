//! Periodic touch of every registered Dynamic rowset.

use hpcview_core::error::TransportError;
use hpcview_rowset::{RemoteRowsetService, RowsetRegistry};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

/// Touch each rowset id currently in `registry`. Failures are logged and
/// skipped; returns how many touches succeeded.
pub fn touch_registered(service: &dyn RemoteRowsetService, registry: &RowsetRegistry) -> usize {
    let mut touched = 0;
    for rowset_id in registry.rowset_ids() {
        match service.touch(rowset_id) {
            Ok(()) => touched += 1,
            Err(fault) => debug!(rowset_id, %fault, "keep-alive touch failed"),
        }
    }
    touched
}

struct Signal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

pub(crate) struct KeepAlive {
    signal: Arc<Signal>,
    thread: Option<JoinHandle<()>>,
}

impl KeepAlive {
    pub(crate) fn start(
        interval: Duration,
        service: Arc<dyn RemoteRowsetService>,
        registry: Arc<RowsetRegistry>,
    ) -> Result<Self, TransportError> {
        let signal = Arc::new(Signal {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });
        let worker = Arc::clone(&signal);
        let thread = thread::Builder::new()
            .name("hpcview-keepalive".to_string())
            .spawn(move || loop {
                {
                    let mut stopped = worker.stopped.lock();
                    if !*stopped {
                        worker.wake.wait_for(&mut stopped, interval);
                    }
                    if *stopped {
                        break;
                    }
                }
                let touched = touch_registered(service.as_ref(), &registry);
                trace!(touched, "keep-alive pass");
            })
            .map_err(|e| TransportError::Io {
                reason: e.to_string(),
            })?;
        Ok(Self {
            signal,
            thread: Some(thread),
        })
    }

    pub(crate) fn stop(&mut self) {
        *self.signal.stopped.lock() = true;
        self.signal.wake.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.stop();
    }
}
