//! Suspension handle for one interceptor stage.
//!
//! An armed handle starts RUNNING and leaves that state exactly once:
//! either `resume()` moves it to DONE or the deadline moves it to CANCELED.
//! Both transitions are a compare-and-set on the same status byte, so the
//! loser of a resume/timeout race is a no-op.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;

const RUNNING: u8 = 0;
const DONE: u8 = 1;
const CANCELED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncStatus {
    Running,
    Done,
    Canceled,
}

/// What the pipeline does with a stage whose deadline elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutFallback {
    /// Proceed as if the stage never happened.
    Success,
    /// Treat the packet as rejected by the extension.
    #[default]
    Failure,
}

/// How a stage's suspension ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    Resumed,
    TimedOut(TimeoutFallback),
}

#[derive(Debug)]
struct AsyncState {
    status: AtomicU8,
    fallback: TimeoutFallback,
    deadline: Instant,
    signal: Mutex<Option<oneshot::Sender<()>>>,
    waiter: Mutex<Option<oneshot::Receiver<()>>>,
}

/// Cloneable handle returned by `Output::async_for`. Extensions keep it
/// and call [`AsyncHandle::resume`] from whatever thread finishes their work.
#[derive(Debug, Clone)]
pub struct AsyncHandle {
    state: Arc<AsyncState>,
}

impl AsyncHandle {
    pub(crate) fn arm(timeout: std::time::Duration, fallback: TimeoutFallback) -> Self {
        let (tx, rx) = oneshot::channel();
        Self {
            state: Arc::new(AsyncState {
                status: AtomicU8::new(RUNNING),
                fallback,
                deadline: Instant::now() + timeout,
                signal: Mutex::new(Some(tx)),
                waiter: Mutex::new(Some(rx)),
            }),
        }
    }

    /// Ends the suspension. Returns false when the handle already reached a
    /// terminal state, in which case nothing happens.
    pub fn resume(&self) -> bool {
        if self
            .state
            .status
            .compare_exchange(RUNNING, DONE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        if let Some(signal) = self.state.signal.lock().take() {
            let _ = signal.send(());
        }
        true
    }

    pub fn status(&self) -> AsyncStatus {
        match self.state.status.load(Ordering::Acquire) {
            RUNNING => AsyncStatus::Running,
            DONE => AsyncStatus::Done,
            _ => AsyncStatus::Canceled,
        }
    }

    pub fn fallback(&self) -> TimeoutFallback {
        self.state.fallback
    }

    pub(crate) fn cancel(&self) -> bool {
        self.state
            .status
            .compare_exchange(RUNNING, CANCELED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Waits for `resume()` or the deadline, whichever wins the status CAS.
    /// Uses the runtime timer wheel, so suspended stages cost no threads.
    pub(crate) async fn wait(&self) -> Resolution {
        let waiter = self.state.waiter.lock().take();
        if let Some(waiter) = waiter {
            if tokio::time::timeout_at(self.state.deadline, waiter).await.is_ok() {
                return Resolution::Resumed;
            }
        }
        if self.cancel() {
            Resolution::TimedOut(self.state.fallback)
        } else {
            Resolution::Resumed
        }
    }
}
