use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, ThreadId};

use log::{debug, error, info};
use tokio::sync::{mpsc, oneshot};

use crate::error_handling::types::DispatchError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to the single thread that owns every display.
///
/// Cloning is cheap; the thread exits once the last handle is dropped.
#[derive(Clone)]
pub struct UiDispatcher {
    sender: mpsc::UnboundedSender<Job>,
    thread_id: ThreadId,
}

impl UiDispatcher {
    pub fn spawn() -> Result<Self, DispatchError> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let handle = thread::Builder::new()
            .name(String::from("acqman-ui"))
            .spawn(move || {
                debug!("UI dispatch thread started");
                while let Some(job) = receiver.blocking_recv() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("UI job panicked");
                    }
                }
                debug!("UI dispatch thread stopped");
            })
            .map_err(|e| {
                error!("Failed to start UI dispatch thread: {}", e);
                DispatchError::SpawnFailed(e)
            })?;
        info!("UI dispatcher ready");
        Ok(Self {
            sender,
            thread_id: handle.thread().id(),
        })
    }

    pub fn is_ui_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Runs `job` on the UI thread and blocks until it returns.
    ///
    /// Runs inline when called from the UI thread itself. Must not be called
    /// from inside an async runtime.
    pub fn invoke_and_wait<F, R>(&self, job: F) -> Result<R, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_ui_thread() {
            return Ok(job());
        }
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Box::new(move || {
                let _ = tx.send(job());
            }))
            .map_err(|_| DispatchError::Disconnected)?;
        rx.blocking_recv().map_err(|_| DispatchError::JobFailed)
    }

    /// Queues `job` on the UI thread without waiting for it.
    pub fn invoke_later<F>(&self, job: F) -> Result<(), DispatchError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sender
            .send(Box::new(job))
            .map_err(|_| DispatchError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn jobs_run_on_ui_thread() {
        let ui = UiDispatcher::spawn().unwrap();
        let probe = ui.clone();
        assert!(!ui.is_ui_thread());
        let on_ui = assert_ok!(ui.invoke_and_wait(move || probe.is_ui_thread()));
        assert!(on_ui);
    }

    #[test]
    fn nested_wait_runs_inline() {
        let ui = UiDispatcher::spawn().unwrap();
        let inner = ui.clone();
        let value = ui
            .invoke_and_wait(move || inner.invoke_and_wait(|| 41 + 1))
            .unwrap();
        assert_eq!(value.unwrap(), 42);
    }

    #[test]
    fn later_jobs_keep_order() {
        let ui = UiDispatcher::spawn().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            assert_ok!(ui.invoke_later(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        // queue is FIFO: once this returns every earlier job ran
        ui.invoke_and_wait(|| ()).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn panicking_job_is_reported_and_thread_survives() {
        let ui = UiDispatcher::spawn().unwrap();
        let result: Result<(), DispatchError> = ui.invoke_and_wait(|| panic!("boom"));
        assert!(matches!(assert_err!(result), DispatchError::JobFailed));
        assert_eq!(ui.invoke_and_wait(|| 7).unwrap(), 7);
    }
}
