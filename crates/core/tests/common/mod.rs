//! Common test utilities for HashDB integration tests.
//!
//! Two fixtures live here:
//! - [`spawn_server`] runs an in-process axum server with canned HashDB routes
//!   for exercising the real HTTP client.
//! - [`Harness`] wires a [`Session`] to a [`MockHashDb`] and runs a
//!   [`MockHost`] on a plain thread that plays the host's UI thread.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread::JoinHandle;

use axum::Router;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

use hashdb_core::testing::{MemorySettingsStore, MockHashDb, MockHost};
use hashdb_core::{
    ui_channel, ConfigureOutcome, Host, HuntOutcome, LookupOutcome, ScanReport, Session,
    Settings, StartError, TaskHandle, TaskRunner, UiDispatcher,
};

/// Re-export fixtures for test convenience
pub use hashdb_core::testing::fixtures;

/// Serve `router` on an ephemeral port and return its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Settings with crc32 selected.
pub fn crc32_settings() -> Settings {
    Settings {
        selected_algorithm: Some(fixtures::crc32()),
        ..Default::default()
    }
}

type Continuation<T> = Box<dyn FnOnce(&hashdb_core::Result<T>) + Send>;

/// A session driven through a mock host on its own UI thread.
///
/// Must be created inside a multi-threaded tokio runtime.
pub struct Harness {
    pub session: Session,
    pub api: Arc<MockHashDb>,
    pub store: Arc<MemorySettingsStore>,
    ui: UiDispatcher,
    ui_thread: JoinHandle<MockHost>,
}

impl Harness {
    pub fn new(host: MockHost, settings: Settings) -> Self {
        let api = Arc::new(MockHashDb::new());
        let store = Arc::new(MemorySettingsStore::new());
        let (ui, queue) = ui_channel();

        let session = Session::new(
            api.clone(),
            store.clone(),
            TaskRunner::with_handle(Handle::current()),
            ui.clone(),
        );
        session.update_settings(settings).unwrap();

        let ui_thread = std::thread::spawn(move || queue.serve(host));

        Self {
            session,
            api,
            store,
            ui,
            ui_thread,
        }
    }

    /// Run `f` on the UI thread.
    pub async fn on_ui<R, F>(&self, f: F) -> R
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Host) -> R + Send + 'static,
    {
        self.ui.call(f).await.unwrap()
    }

    /// Start a workflow on the UI thread without waiting for it.
    pub async fn start<S>(&self, start: S) -> Result<TaskHandle, StartError>
    where
        S: FnOnce(&Session, &mut dyn Host) -> Result<TaskHandle, StartError> + Send + 'static,
    {
        let session = self.session.clone();
        self.on_ui(move |host| start(&session, host)).await
    }

    /// Start a workflow and wait for its outcome. Errors are rendered as text.
    async fn run<T, S>(&self, start: S) -> Result<T, String>
    where
        T: Clone + Send + 'static,
        S: FnOnce(&Session, &mut dyn Host, Continuation<T>) -> Result<TaskHandle, StartError>
            + Send
            + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let then: Continuation<T> = Box::new(move |result| {
            let _ = tx.send(result.as_ref().map(T::clone).map_err(|e| e.to_string()));
        });

        let session = self.session.clone();
        let handle = self
            .on_ui(move |host| start(&session, host, then))
            .await
            .map_err(|e| format!("not started: {}", e))?;
        handle.wait().await;
        rx.await.unwrap()
    }

    pub async fn lookup(&self) -> Result<LookupOutcome, String> {
        self.run(|session, host, then| session.lookup_then(host, then))
            .await
    }

    pub async fn scan(&self, convert_values: bool) -> Result<ScanReport, String> {
        self.run(move |session, host, then| session.scan_then(host, convert_values, then))
            .await
    }

    pub async fn hunt(&self) -> Result<HuntOutcome, String> {
        self.run(|session, host, then| session.hunt_then(host, then))
            .await
    }

    pub async fn configure(&self) -> Result<ConfigureOutcome, String> {
        self.run(|session, host, then| session.configure_then(host, then))
            .await
    }

    /// Shut the UI thread down and return the host for inspection.
    pub async fn finish(self) -> MockHost {
        let Harness {
            session,
            ui,
            ui_thread,
            ..
        } = self;
        drop(session);
        drop(ui);
        tokio::task::spawn_blocking(move || ui_thread.join().unwrap())
            .await
            .unwrap()
    }
}
