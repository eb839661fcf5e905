//! The host disassembler as seen by the resolution pipeline.
//!
//! Every method runs on the host's UI thread. Background tasks never call a
//! [`Host`] directly; they go through [`crate::ui::UiDispatcher`].

use crate::api::Algorithm;
use crate::config::Settings;
use crate::error::Result;

/// A value read from the host's current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightedValue {
    /// Address of the instruction or data item holding the value, if any.
    pub address: Option<u64>,
    pub value: u64,
}

/// Handle to a symbolic namespace (an enumeration in most disassemblers).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceHandle {
    pub id: u64,
    pub name: String,
    pub width_bytes: u8,
}

/// Result of inserting a named value into a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Inserted, or the exact name/value pair was already present.
    Ok,
    /// The name is used by another value or symbol.
    NameTaken,
    /// The host cannot hold more members with this value.
    ValueLimitReached,
}

/// The normalized unit handed to the host for labelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub name: String,
    pub value: u64,
    pub is_api: bool,
}

/// An algorithm offered by a hunt, with its hit statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct HuntCandidate {
    pub algorithm: Algorithm,
    pub count: u64,
    pub hitrate: f64,
}

/// Identifier characters accepted when the host does not say otherwise.
pub fn default_is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '?' | '@')
}

/// Host collaborator interface.
pub trait Host {
    // -- reading ------------------------------------------------------------

    /// The highlighted constant, or the value at the selected address.
    fn read_highlighted_or_selected_value(&mut self) -> Option<HighlightedValue>;

    /// The selected address range as `(start, end)`, end exclusive.
    fn read_selected_address_range(&mut self) -> Option<(u64, u64)>;

    /// The width in bytes of the data item at `address`, if the host knows it.
    fn guess_type_width(&mut self, address: u64) -> Option<u8>;

    /// Read a little-endian integer of `width` bytes.
    fn read_integer(&mut self, address: u64, width: u8) -> Result<u64>;

    // -- labelling ----------------------------------------------------------

    fn create_or_find_namespace(&mut self, name: &str, width_bytes: u8) -> Result<NamespaceHandle>;

    fn insert_member(
        &mut self,
        namespace: &NamespaceHandle,
        name: &str,
        value: u64,
    ) -> Result<InsertResult>;

    /// Display the operand or data item at `address` as `value`.
    fn apply_label(
        &mut self,
        namespace: &NamespaceHandle,
        address: u64,
        value: &EnumValue,
        width: u8,
    ) -> Result<()>;

    /// Redeclare the storage at `address` as an integer of `width` bytes.
    fn convert_storage(&mut self, address: u64, width: u8) -> Result<()>;

    /// Whether `name` is already used by any symbol or namespace member.
    fn name_exists(&mut self, name: &str) -> bool;

    fn set_name(&mut self, address: u64, name: &str) -> Result<()>;

    fn is_ident_char(&self, c: char) -> bool {
        default_is_ident_char(c)
    }

    // -- prompts ------------------------------------------------------------

    /// Pick one of `options`. `None` means the user cancelled.
    fn prompt_choice(&mut self, title: &str, options: &[String]) -> Option<String>;

    /// Ask for a replacement for `original`; `invalid_positions` are char indices.
    fn prompt_text_replacement(&mut self, original: &str, invalid_positions: &[usize])
        -> Option<String>;

    /// Offer to import every hash exported by one of `modules`.
    fn prompt_module_import(&mut self, api_name: &str, modules: &[String]) -> Option<String>;

    fn prompt_settings(&mut self, current: &Settings, algorithms: &[Algorithm]) -> Option<Settings>;

    /// Pick a hunt candidate by index.
    fn prompt_hunt_selection(&mut self, candidates: &[HuntCandidate]) -> Option<usize>;

    // -- status -------------------------------------------------------------

    /// Non-modal status line.
    fn message(&mut self, text: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ident_chars() {
        for c in ['a', 'Z', '0', '_', '$', '?', '@'] {
            assert!(default_is_ident_char(c), "{c}");
        }
        for c in [' ', '.', '-', '!', 'é', '\0'] {
            assert!(!default_is_ident_char(c), "{c:?}");
        }
    }
}
