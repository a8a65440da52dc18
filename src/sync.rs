use crate::error::ScheduleResult;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Monotonic sequence guard for last-request-wins refresh. `begin` stamps an
/// outgoing fetch; `admit` accepts a result only if nothing newer has been
/// applied, so a slow older response can never overwrite a fresher one.
#[derive(Debug, Default)]
pub struct SyncCursor {
    issued: AtomicU64,
    applied: AtomicU64,
}

impl SyncCursor {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(dead_code)]
    pub fn begin(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn admit(&self, seq: u64) -> bool {
        loop {
            let current = self.applied.load(Ordering::SeqCst);
            if seq <= current {
                return false;
            }
            if self
                .applied
                .compare_exchange(current, seq, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }
}

/// Timer-driven schedule refresh for a client viewing one date: re-fetch on
/// a fixed interval, apply only admitted (freshest) results, stop on view
/// teardown. Fetch errors are logged and retried on the next tick rather
/// than killing the loop.
#[allow(dead_code)]
pub struct SyncPoller {
    stop_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

#[allow(dead_code)]
impl SyncPoller {
    pub fn spawn<T, F, A>(interval: Duration, cursor: Arc<SyncCursor>, fetch: F, apply: A) -> Self
    where
        T: Send + 'static,
        F: Fn() -> ScheduleResult<T> + Send + 'static,
        A: Fn(T) + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = std::thread::spawn(move || loop {
            let seq = cursor.begin();
            match fetch() {
                Ok(view) => {
                    if cursor.admit(seq) {
                        apply(view);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "schedule refresh failed; will retry");
                }
            }
            match stop_rx.recv_timeout(interval) {
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        });
        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyncPoller {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
