//! Single-slot background executor.
//!
//! At most one task is in flight. A caller first reserves the slot, which
//! fails immediately while another task runs, then submits a future together
//! with the one continuation that receives its result. The slot is released
//! after the continuation returns, whatever happened before.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{HashDbError, Result};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("a request is already in flight")]
    Busy,

    #[error("failed to start the worker runtime: {0}")]
    Runtime(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Busy,
}

/// Runs one task at a time off the UI thread.
pub struct TaskRunner {
    handle: Handle,
    slot: Arc<Semaphore>,
    runtime: Option<Runtime>,
}

impl TaskRunner {
    /// Create a runner with its own single worker thread.
    pub fn new() -> std::result::Result<Self, RunnerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("hashdb-worker")
            .enable_all()
            .build()
            .map_err(|e| RunnerError::Runtime(e.to_string()))?;

        Ok(Self {
            handle: runtime.handle().clone(),
            slot: Arc::new(Semaphore::new(1)),
            runtime: Some(runtime),
        })
    }

    /// Create a runner that spawns onto an existing runtime.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            slot: Arc::new(Semaphore::new(1)),
            runtime: None,
        }
    }

    pub fn state(&self) -> RunnerState {
        if self.slot.available_permits() == 0 {
            RunnerState::Busy
        } else {
            RunnerState::Idle
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state() == RunnerState::Busy
    }

    /// Claim the slot, or fail with [`RunnerError::Busy`] without waiting.
    pub fn try_reserve(&self) -> std::result::Result<TaskSlot, RunnerError> {
        let permit = self
            .slot
            .clone()
            .try_acquire_owned()
            .map_err(|_| RunnerError::Busy)?;

        Ok(TaskSlot {
            permit,
            handle: self.handle.clone(),
        })
    }

    /// Reserve and submit in one step.
    pub fn start<T, Fut, C>(
        &self,
        target: Fut,
        continuation: C,
    ) -> std::result::Result<TaskHandle, RunnerError>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        C: FnOnce(Result<T>) + Send + 'static,
    {
        Ok(self.try_reserve()?.submit(target, continuation))
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// A reserved slot; dropping it without submitting frees the runner.
pub struct TaskSlot {
    permit: OwnedSemaphorePermit,
    handle: Handle,
}

impl TaskSlot {
    /// Run `target` on the worker and hand its result to `continuation`.
    ///
    /// A panic in `target` reaches the continuation as
    /// [`HashDbError::TaskPanicked`]. A panic in the continuation is logged.
    pub fn submit<T, Fut, C>(self, target: Fut, continuation: C) -> TaskHandle
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        C: FnOnce(Result<T>) + Send + 'static,
    {
        let permit = self.permit;
        let join = self.handle.spawn(async move {
            let _permit = permit;
            debug!("Background task started");

            let outcome = match AssertUnwindSafe(target).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("Background task panicked: {}", message);
                    Err(HashDbError::TaskPanicked { message })
                }
            };

            if let Err(panic) =
                std::panic::catch_unwind(AssertUnwindSafe(move || continuation(outcome)))
            {
                error!(
                    "Task continuation panicked: {}",
                    panic_message(panic.as_ref())
                );
            }

            debug!("Background task finished");
        });

        TaskHandle { join }
    }
}

/// Handle to a submitted task.
pub struct TaskHandle {
    join: JoinHandle<()>,
}

impl TaskHandle {
    /// Wait until the continuation has run and the slot is free again.
    pub async fn wait(self) {
        if let Err(e) = self.join.await {
            error!("Background task did not complete: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    fn runner() -> TaskRunner {
        TaskRunner::with_handle(Handle::current())
    }

    #[tokio::test]
    async fn test_second_reserve_rejected_while_busy() {
        let runner = runner();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let handle = runner
            .start(
                async move {
                    let _ = release_rx.await;
                    Ok(1u32)
                },
                |_| {},
            )
            .unwrap();

        assert_eq!(runner.state(), RunnerState::Busy);
        assert!(matches!(runner.try_reserve(), Err(RunnerError::Busy)));

        release_tx.send(()).unwrap();
        handle.wait().await;
        assert_eq!(runner.state(), RunnerState::Idle);
        assert!(runner.try_reserve().is_ok());
    }

    #[tokio::test]
    async fn test_continuation_receives_result() {
        let runner = runner();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();

        runner
            .start(async { Ok(42u64) }, move |result| {
                *sink.lock().unwrap() = Some(result.unwrap());
            })
            .unwrap()
            .wait()
            .await;

        assert_eq!(*seen.lock().unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_idle_after_error() {
        let runner = runner();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();

        runner
            .start(
                async { Err::<(), _>(HashDbError::InvalidHash("missing hash".to_string())) },
                move |result| {
                    *sink.lock().unwrap() = Some(result.is_err());
                },
            )
            .unwrap()
            .wait()
            .await;

        assert_eq!(*seen.lock().unwrap(), Some(true));
        assert!(!runner.is_busy());
    }

    #[tokio::test]
    async fn test_idle_after_target_panic() {
        let runner = runner();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();

        runner
            .start(
                async {
                    if true {
                        panic!("boom");
                    }
                    Ok(())
                },
                move |result: Result<()>| {
                    *sink.lock().unwrap() = Some(result);
                },
            )
            .unwrap()
            .wait()
            .await;

        let result = seen.lock().unwrap().take().unwrap();
        match result {
            Err(HashDbError::TaskPanicked { message }) => assert_eq!(message, "boom"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(runner.state(), RunnerState::Idle);
    }

    #[tokio::test]
    async fn test_idle_after_continuation_panic() {
        let runner = runner();

        runner
            .start(async { Ok(()) }, |_| panic!("continuation failed"))
            .unwrap()
            .wait()
            .await;
        assert_eq!(runner.state(), RunnerState::Idle);

        runner
            .start(
                async { Err::<(), _>(HashDbError::InvalidHit("x".to_string())) },
                |_| panic!("error continuation failed"),
            )
            .unwrap()
            .wait()
            .await;
        assert_eq!(runner.state(), RunnerState::Idle);
    }

    #[tokio::test]
    async fn test_dropped_slot_frees_runner() {
        let runner = runner();
        let slot = runner.try_reserve().unwrap();
        assert!(runner.is_busy());
        drop(slot);
        assert!(!runner.is_busy());
    }

    #[test]
    fn test_owned_runtime() {
        let runner = TaskRunner::new().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = runner
            .start(async { Ok(std::thread::current().name().map(String::from)) }, move |r| {
                let _ = tx.send(r.unwrap());
            })
            .unwrap();

        let name = rx.recv().unwrap();
        assert_eq!(name.as_deref(), Some("hashdb-worker"));
        while !handle.is_finished() {
            std::thread::yield_now();
        }
        assert!(!runner.is_busy());
    }
}
