//! The user-facing workflows: lookup, scan, hunt and configure.
//!
//! Each workflow is started from the UI thread through [`Session`], runs its
//! network calls on the session's [`crate::runner::TaskRunner`] and touches
//! the host only through the UI dispatcher.

mod context;
mod hunt;
mod lookup;
mod scan;
mod session;

pub use hunt::rank_candidates;
pub use session::Session;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::api::Algorithm;
use crate::host::EnumValue;
use crate::naming::MemberOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowKind {
    Lookup,
    Scan,
    Hunt,
    Configure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkflowState {
    #[default]
    NotRequested,
    Requested,
    Completed,
    Failed,
}

/// Why a workflow did not start. No task was submitted in any of these cases.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("Please wait until the previous request is finished. Requests timeout after {timeout}.")]
    Busy { timeout: String },

    #[error("nothing is highlighted or selected")]
    NoValue,

    #[error("no address range is selected")]
    NoRange,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleImportResult {
    Imported { module: String, count: usize },
    Failed { module: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Applied {
        value: EnumValue,
        member: MemberOutcome,
        module_import: Option<ModuleImportResult>,
    },
    NoMatch,
    /// The user declined a prompt (settings or disambiguation).
    Cancelled,
}

/// One scanned value that was resolved and applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    pub address: u64,
    /// Bytes read at `address`.
    pub width: u8,
    pub value: EnumValue,
    pub member: MemberOutcome,
    /// `ptr_` label set on the address when values are converted.
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub applied: Vec<ScanEntry>,
    /// Addresses whose value had no match.
    pub unmatched: Vec<u64>,
    /// Set when the user declined a prompt; entries after that point were not applied.
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HuntOutcome {
    Selected(Algorithm),
    NoCandidates,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigureOutcome {
    Configured(crate::config::Settings),
    Cancelled,
}

/// Per-workflow state, shared between the session and running tasks.
#[derive(Clone, Default)]
pub(crate) struct WorkflowBoard {
    states: Arc<Mutex<HashMap<WorkflowKind, WorkflowState>>>,
}

impl WorkflowBoard {
    pub(crate) fn get(&self, kind: WorkflowKind) -> WorkflowState {
        let states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        states.get(&kind).copied().unwrap_or_default()
    }

    pub(crate) fn set(&self, kind: WorkflowKind, state: WorkflowState) {
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        tracing::debug!(?kind, ?state, "Workflow state changed");
        states.insert(kind, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_board_defaults_to_not_requested() {
        let board = WorkflowBoard::default();
        assert_eq!(board.get(WorkflowKind::Hunt), WorkflowState::NotRequested);
        board.set(WorkflowKind::Hunt, WorkflowState::Requested);
        assert_eq!(board.get(WorkflowKind::Hunt), WorkflowState::Requested);
        assert_eq!(board.get(WorkflowKind::Scan), WorkflowState::NotRequested);
    }

    #[test]
    fn test_busy_message() {
        let err = StartError::Busy {
            timeout: "15 seconds".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Please wait until the previous request is finished. Requests timeout after 15 seconds."
        );
    }
}
