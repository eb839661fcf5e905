pub mod api;
pub mod config;
pub mod error;
pub mod host;
pub mod literal;
pub mod naming;
pub mod resolver;
pub mod runner;
pub mod testing;
pub mod ui;
pub mod workflow;

pub use api::{Algorithm, Endpoint, Hash, HashDbApi, HashDbClient, Hit};
pub use config::{
    FileSettingsStore, MemorySettingsStore, Settings, SettingsRecord, SettingsScope,
    SettingsStore,
};
pub use error::{HashDbError, Result};
pub use host::{EnumValue, HighlightedValue, Host, HuntCandidate, InsertResult, NamespaceHandle};
pub use literal::{parse_integer_literal, LiteralError};
pub use resolver::{Disambiguator, ModuleImport, Resolution, ResolvedHash};
pub use runner::{RunnerError, RunnerState, TaskHandle, TaskRunner};
pub use ui::{ui_channel, UiDispatcher, UiQueue};
pub use workflow::{
    ConfigureOutcome, HuntOutcome, LookupOutcome, ModuleImportResult, ScanEntry, ScanReport,
    Session, StartError, WorkflowKind, WorkflowState,
};
