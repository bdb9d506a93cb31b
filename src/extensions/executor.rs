use super::isolation::IsolationError;
use crate::interceptor::panic_payload_to_string;
use futures::FutureExt;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::runtime::Handle;
use tokio::task::{AbortHandle, JoinHandle};

/// Task executor owned by one extension. Panics are contained and logged;
/// everything still running is aborted on shutdown.
pub(crate) struct ManagedExecutor {
    extension: String,
    runtime: Option<Handle>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ManagedExecutor {
    pub(crate) fn new(extension: &str) -> Self {
        Self {
            extension: extension.to_owned(),
            runtime: Handle::try_current().ok(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn spawn<F>(&self, future: F) -> Result<AbortHandle, IsolationError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = match self.runtime.clone().or_else(|| Handle::try_current().ok()) {
            Some(runtime) => runtime,
            None => return Err(IsolationError::NoRuntime(self.extension.clone())),
        };
        let extension = self.extension.clone();
        let handle = runtime.spawn(async move {
            if let Err(payload) = AssertUnwindSafe(future).catch_unwind().await {
                tracing::error!(
                    extension = %extension,
                    panic = %panic_payload_to_string(payload.as_ref()),
                    "managed extension task panicked"
                );
            }
        });
        let abort = handle.abort_handle();
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
        Ok(abort)
    }

    pub(crate) fn running(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.len()
    }

    pub(crate) fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        if !tasks.is_empty() {
            tracing::debug!(extension = %self.extension, tasks = tasks.len(), "aborting managed tasks");
        }
        for task in tasks {
            task.abort();
        }
    }
}
