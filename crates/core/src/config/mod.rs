//! Session settings and their persistence.

mod loader;
mod types;

pub use loader::{
    load_record_from_file, load_record_from_str, load_settings, save_settings, FileSettingsStore,
    MemorySettingsStore, SettingsStore,
};
pub use types::*;
