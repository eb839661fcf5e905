use std::future::Future;
use std::sync::{Arc, RwLock};

use tracing::{error, info, warn};

use crate::api::HashDbApi;
use crate::config::{self, Settings, SettingsScope, SettingsStore};
use crate::error::{HashDbError, Result};
use crate::host::Host;
use crate::runner::{RunnerState, TaskHandle, TaskRunner, TaskSlot};
use crate::ui::UiDispatcher;

use super::context::TaskContext;
use super::{
    hunt, lookup, scan, ConfigureOutcome, HuntOutcome, LookupOutcome, ScanReport, StartError,
    WorkflowBoard, WorkflowKind, WorkflowState,
};

/// Owns the live settings and starts workflows.
///
/// Cheaply cloneable; every clone shares the same settings, runner and
/// workflow states. The `lookup`, `scan`, `hunt`, `configure` and
/// `set_xor_from_selection` entry points must be called on the UI thread.
#[derive(Clone)]
pub struct Session {
    settings: Arc<RwLock<Settings>>,
    store: Arc<dyn SettingsStore>,
    api: Arc<dyn HashDbApi>,
    runner: Arc<TaskRunner>,
    ui: UiDispatcher,
    board: WorkflowBoard,
}

impl Session {
    pub fn new(
        api: Arc<dyn HashDbApi>,
        store: Arc<dyn SettingsStore>,
        runner: TaskRunner,
        ui: UiDispatcher,
    ) -> Self {
        Self {
            settings: Arc::new(RwLock::new(Settings::default())),
            store,
            api,
            runner: Arc::new(runner),
            ui,
            board: WorkflowBoard::default(),
        }
    }

    // =========================================================================
    // Settings lifecycle
    // =========================================================================

    /// Replace the live settings with defaults, then the global record, then
    /// the local record.
    pub fn load_settings(&self) -> Result<()> {
        let loaded = config::load_settings(self.store.as_ref())?;
        info!(
            api_url = %loaded.api_url,
            algorithm = ?loaded.selected_algorithm.as_ref().map(|a| a.name.as_str()),
            "Settings loaded"
        );
        *self.write_settings() = loaded;
        Ok(())
    }

    pub fn save_settings(&self, scope: SettingsScope) -> Result<()> {
        let snapshot = self.settings();
        config::save_settings(self.store.as_ref(), &snapshot, scope)
    }

    /// Snapshot of the live settings.
    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Validate and replace the live settings. Running tasks keep their snapshot.
    pub fn update_settings(&self, settings: Settings) -> Result<()> {
        settings.validate()?;
        *self.write_settings() = settings;
        Ok(())
    }

    fn write_settings(&self) -> std::sync::RwLockWriteGuard<'_, Settings> {
        self.settings.write().unwrap_or_else(|e| e.into_inner())
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn workflow_state(&self, kind: WorkflowKind) -> WorkflowState {
        self.board.get(kind)
    }

    pub fn runner_state(&self) -> RunnerState {
        self.runner.state()
    }

    // =========================================================================
    // Workflows
    // =========================================================================

    /// Store the highlighted value as the XOR key and enable XOR.
    pub fn set_xor_from_selection(&self, host: &mut dyn Host) -> std::result::Result<u64, StartError> {
        let Some(selected) = host.read_highlighted_or_selected_value() else {
            host.message("HashDB ERROR: Invalid selection; nothing was selected.");
            return Err(StartError::NoValue);
        };

        {
            let mut settings = self.write_settings();
            settings.xor_enabled = true;
            settings.xor_value = selected.value;
        }
        info!("XOR key set to {:#x}", selected.value);
        host.message(&format!("XOR key set: {:#x}", selected.value));
        Ok(selected.value)
    }

    pub fn configure(&self, host: &mut dyn Host) -> std::result::Result<TaskHandle, StartError> {
        self.configure_then(host, |_| {})
    }

    /// Fetch algorithms and show the settings prompt.
    pub fn configure_then<C>(
        &self,
        host: &mut dyn Host,
        then: C,
    ) -> std::result::Result<TaskHandle, StartError>
    where
        C: FnOnce(&Result<ConfigureOutcome>) + Send + 'static,
    {
        let slot = self.reserve(host)?;
        let mut ctx = self.task_context(host)?;

        Ok(self.submit(slot, WorkflowKind::Configure, then, async move {
            Ok(match ctx.prompt_settings().await? {
                Some(settings) => ConfigureOutcome::Configured(settings),
                None => ConfigureOutcome::Cancelled,
            })
        }))
    }

    pub fn lookup(&self, host: &mut dyn Host) -> std::result::Result<TaskHandle, StartError> {
        self.lookup_then(host, |_| {})
    }

    /// Look up the highlighted value; `then` receives the outcome after the
    /// session has recorded and reported it.
    pub fn lookup_then<C>(
        &self,
        host: &mut dyn Host,
        then: C,
    ) -> std::result::Result<TaskHandle, StartError>
    where
        C: FnOnce(&Result<LookupOutcome>) + Send + 'static,
    {
        let slot = self.reserve(host)?;
        let Some(input) = host.read_highlighted_or_selected_value() else {
            host.message("HashDB ERROR: Invalid selection; nothing was selected.");
            return Err(StartError::NoValue);
        };
        let ctx = self.task_context(host)?;

        Ok(self.submit(slot, WorkflowKind::Lookup, then, lookup::run(ctx, input)))
    }

    pub fn scan(
        &self,
        host: &mut dyn Host,
        convert_values: bool,
    ) -> std::result::Result<TaskHandle, StartError> {
        self.scan_then(host, convert_values, |_| {})
    }

    /// Look up every value in the selected range.
    pub fn scan_then<C>(
        &self,
        host: &mut dyn Host,
        convert_values: bool,
        then: C,
    ) -> std::result::Result<TaskHandle, StartError>
    where
        C: FnOnce(&Result<ScanReport>) + Send + 'static,
    {
        let slot = self.reserve(host)?;
        let range = match host.read_selected_address_range() {
            Some((start, end)) if start < end => (start, end),
            _ => {
                host.message("HashDB ERROR: No address range selected.");
                return Err(StartError::NoRange);
            }
        };
        let ctx = self.task_context(host)?;
        host.message(&format!(
            "HashDB: Scanning for hashes, please wait! Timeout: {}.",
            ctx.settings.timeout_description()
        ));

        Ok(self.submit(
            slot,
            WorkflowKind::Scan,
            then,
            scan::run(ctx, range, convert_values),
        ))
    }

    pub fn hunt(&self, host: &mut dyn Host) -> std::result::Result<TaskHandle, StartError> {
        self.hunt_then(host, |_| {})
    }

    /// Find the algorithms that could have produced the highlighted value.
    pub fn hunt_then<C>(
        &self,
        host: &mut dyn Host,
        then: C,
    ) -> std::result::Result<TaskHandle, StartError>
    where
        C: FnOnce(&Result<HuntOutcome>) + Send + 'static,
    {
        let slot = self.reserve(host)?;
        let Some(input) = host.read_highlighted_or_selected_value() else {
            host.message("HashDB ERROR: Invalid selection; nothing was selected.");
            return Err(StartError::NoValue);
        };
        let ctx = self.task_context(host)?;
        host.message(&format!(
            "HashDB: Hunting for a hash algorithm, please wait! Timeout: {}.",
            ctx.settings.timeout_description()
        ));

        Ok(self.submit(slot, WorkflowKind::Hunt, then, hunt::run(ctx, input)))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn reserve(&self, host: &mut dyn Host) -> std::result::Result<TaskSlot, StartError> {
        self.runner.try_reserve().map_err(|_| {
            warn!("A request was started while another is in flight");
            let err = StartError::Busy {
                timeout: self.settings().timeout_description(),
            };
            host.message(&err.to_string());
            err
        })
    }

    fn task_context(&self, host: &mut dyn Host) -> std::result::Result<TaskContext, StartError> {
        let settings = self.settings();
        if let Err(e) = settings.validate() {
            host.message(&format!("HashDB ERROR: {}", e));
            return Err(StartError::InvalidSettings(e.to_string()));
        }

        Ok(TaskContext {
            api: self.api.clone(),
            ui: self.ui.clone(),
            shared_settings: self.settings.clone(),
            settings,
        })
    }

    fn submit<T, Fut, C>(&self, slot: TaskSlot, kind: WorkflowKind, then: C, task: Fut) -> TaskHandle
    where
        T: std::fmt::Debug + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        C: FnOnce(&Result<T>) + Send + 'static,
    {
        let board = self.board.clone();
        let ui = self.ui.clone();
        board.set(kind, WorkflowState::Requested);
        info!(?kind, "Workflow requested");

        slot.submit(task, move |result: Result<T>| {
            match &result {
                Ok(outcome) => {
                    info!(?kind, ?outcome, "Workflow completed");
                    board.set(kind, WorkflowState::Completed);
                }
                Err(e) => {
                    error!(?kind, "Workflow failed: {}", e);
                    board.set(kind, WorkflowState::Failed);
                    ui.message(failure_message(kind, e));
                }
            }
            then(&result);
        })
    }
}

fn failure_message(kind: WorkflowKind, err: &HashDbError) -> String {
    let what = match kind {
        WorkflowKind::Lookup => "hash lookup",
        WorkflowKind::Scan => "hash scan",
        WorkflowKind::Hunt => "algorithm hunt",
        WorkflowKind::Configure => "configuration",
    };
    match err {
        HashDbError::Timeout { .. } => format!("ERROR: HashDB API {} request timed out.", what),
        other => format!("ERROR: HashDB {} failed: {}", what, other),
    }
}
