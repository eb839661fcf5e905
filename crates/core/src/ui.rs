//! Message passing from background tasks to the host's UI thread.
//!
//! Background tasks hold a [`UiDispatcher`] and send closures; the UI thread
//! owns the matching [`UiQueue`] and runs them against its [`Host`], either on
//! each event-loop tick ([`UiQueue::drain`]) or in a dedicated loop
//! ([`UiQueue::serve`]).

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::{HashDbError, Result};
use crate::host::Host;
use crate::resolver::Disambiguator;

type UiJob = Box<dyn FnOnce(&mut dyn Host) + Send>;

/// Create a connected dispatcher/queue pair.
pub fn ui_channel() -> (UiDispatcher, UiQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UiDispatcher { tx }, UiQueue { rx })
}

/// Sends work to the UI thread.
///
/// Cheaply cloneable.
#[derive(Clone)]
pub struct UiDispatcher {
    tx: mpsc::UnboundedSender<UiJob>,
}

impl UiDispatcher {
    /// Run `f` on the UI thread and wait for its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Host) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Box::new(move |host: &mut dyn Host| {
                let _ = reply_tx.send(f(host));
            }))
            .map_err(|_| queue_closed())?;

        reply_rx.await.map_err(|_| queue_closed())
    }

    /// Queue `f` on the UI thread without waiting for it.
    pub fn post<F>(&self, f: F)
    where
        F: FnOnce(&mut dyn Host) + Send + 'static,
    {
        if self.tx.send(Box::new(f)).is_err() {
            tracing::warn!("UI queue closed, dropping posted job");
        }
    }

    /// Queue a status message.
    pub fn message(&self, text: impl Into<String>) {
        let text = text.into();
        self.post(move |host| host.message(&text));
    }
}

#[async_trait]
impl Disambiguator for UiDispatcher {
    async fn choose(&self, options: Vec<String>) -> Result<Option<String>> {
        self.call(move |host| host.prompt_choice("Select the best hash match", &options))
            .await
    }
}

fn queue_closed() -> HashDbError {
    HashDbError::HostOperationFailed("UI thread is no longer accepting work".to_string())
}

/// Receives work on the UI thread.
pub struct UiQueue {
    rx: mpsc::UnboundedReceiver<UiJob>,
}

impl UiQueue {
    /// Run everything queued so far. Returns the number of jobs run.
    pub fn drain(&mut self, host: &mut dyn Host) -> usize {
        let mut count = 0;
        while let Ok(job) = self.rx.try_recv() {
            job(host);
            count += 1;
        }
        count
    }

    /// Run jobs until every dispatcher is dropped, then hand the host back.
    ///
    /// Blocks the calling thread; must not be called from async code.
    pub fn serve<H: Host>(mut self, mut host: H) -> H {
        while let Some(job) = self.rx.blocking_recv() {
            job(&mut host);
        }
        host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHost;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_call_runs_on_serving_thread() {
        let (ui, queue) = ui_channel();
        let ui_thread = std::thread::spawn(move || {
            let id = std::thread::current().id();
            (queue.serve(MockHost::new()), id)
        });

        let ran_on = ui
            .call(|host| {
                host.message("hello");
                std::thread::current().id()
            })
            .await
            .unwrap();
        ui.message("bye");
        drop(ui);

        let (host, ui_id) = ui_thread.join().unwrap();
        assert_eq!(ran_on, ui_id);
        assert_eq!(host.messages(), ["hello", "bye"]);
    }

    #[test]
    fn test_drain_runs_posted_jobs() {
        let (ui, mut queue) = ui_channel();
        let mut host = MockHost::new();
        ui.message("one");
        ui.message("two");

        assert_eq!(queue.drain(&mut host), 2);
        assert_eq!(queue.drain(&mut host), 0);
        assert_eq!(host.messages(), ["one", "two"]);
    }

    #[tokio::test]
    async fn test_call_fails_when_queue_dropped() {
        let (ui, queue) = ui_channel();
        drop(queue);
        let result = ui.call(|host| host.name_exists("x")).await;
        assert!(matches!(result, Err(HashDbError::HostOperationFailed(_))));
    }
}
