//! Scriptable host for testing.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::api::Algorithm;
use crate::config::Settings;
use crate::error::{HashDbError, Result};
use crate::host::{EnumValue, HighlightedValue, Host, HuntCandidate, InsertResult, NamespaceHandle};

/// A label applied through [`Host::apply_label`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedLabel {
    pub namespace: String,
    pub address: u64,
    pub name: String,
    pub value: u64,
    pub width: u8,
    pub is_api: bool,
}

#[derive(Debug, Clone)]
struct MockNamespace {
    handle: NamespaceHandle,
    members: Vec<(String, u64)>,
}

/// In-memory implementation of the [`Host`] trait.
///
/// Prompts are answered from per-prompt queues filled with the `with_*`
/// builders; an empty queue answers like a cancelled dialog. Everything the
/// pipeline does to the host is recorded for assertions.
#[derive(Debug)]
pub struct MockHost {
    highlighted: Option<HighlightedValue>,
    range: Option<(u64, u64)>,
    memory_base: u64,
    memory: Vec<u8>,
    type_widths: BTreeMap<u64, u8>,
    value_limit: usize,

    namespaces: Vec<MockNamespace>,
    reserved_names: HashSet<String>,
    names: BTreeMap<u64, String>,
    labels: Vec<RecordedLabel>,
    converted: Vec<(u64, u8)>,

    choices: VecDeque<Option<String>>,
    replacements: VecDeque<Option<String>>,
    module_imports: VecDeque<Option<String>>,
    settings_answers: VecDeque<Option<Settings>>,
    hunt_selections: VecDeque<Option<usize>>,

    choice_prompts: Vec<Vec<String>>,
    replacement_prompts: Vec<(String, Vec<usize>)>,
    module_prompts: Vec<(String, Vec<String>)>,
    settings_prompts: Vec<Vec<Algorithm>>,
    hunt_prompts: Vec<Vec<HuntCandidate>>,
    messages: Vec<String>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            highlighted: None,
            range: None,
            memory_base: 0,
            memory: Vec::new(),
            type_widths: BTreeMap::new(),
            value_limit: 256,
            namespaces: Vec::new(),
            reserved_names: HashSet::new(),
            names: BTreeMap::new(),
            labels: Vec::new(),
            converted: Vec::new(),
            choices: VecDeque::new(),
            replacements: VecDeque::new(),
            module_imports: VecDeque::new(),
            settings_answers: VecDeque::new(),
            hunt_selections: VecDeque::new(),
            choice_prompts: Vec::new(),
            replacement_prompts: Vec::new(),
            module_prompts: Vec::new(),
            settings_prompts: Vec::new(),
            hunt_prompts: Vec::new(),
            messages: Vec::new(),
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    pub fn with_highlighted(mut self, address: Option<u64>, value: u64) -> Self {
        self.highlighted = Some(HighlightedValue { address, value });
        self
    }

    pub fn with_range(mut self, start: u64, end: u64) -> Self {
        self.range = Some((start, end));
        self
    }

    /// Map `bytes` at `base`.
    pub fn with_memory(mut self, base: u64, bytes: &[u8]) -> Self {
        self.memory_base = base;
        self.memory = bytes.to_vec();
        self
    }

    pub fn with_type_width(mut self, address: u64, width: u8) -> Self {
        self.type_widths.insert(address, width);
        self
    }

    /// Mark `name` as used by some unrelated symbol.
    pub fn with_reserved_name(mut self, name: &str) -> Self {
        self.reserved_names.insert(name.to_string());
        self
    }

    /// Maximum members sharing one value in a namespace.
    pub fn with_value_limit(mut self, limit: usize) -> Self {
        self.value_limit = limit;
        self
    }

    pub fn with_choice(mut self, answer: Option<String>) -> Self {
        self.choices.push_back(answer);
        self
    }

    pub fn with_replacement(mut self, answer: Option<String>) -> Self {
        self.replacements.push_back(answer);
        self
    }

    pub fn with_module_import(mut self, answer: Option<String>) -> Self {
        self.module_imports.push_back(answer);
        self
    }

    pub fn with_settings_answer(mut self, answer: Option<Settings>) -> Self {
        self.settings_answers.push_back(answer);
        self
    }

    pub fn with_hunt_selection(mut self, answer: Option<usize>) -> Self {
        self.hunt_selections.push_back(answer);
        self
    }

    // =========================================================================
    // Assertions
    // =========================================================================

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn labels(&self) -> &[RecordedLabel] {
        &self.labels
    }

    /// Members of the namespace called `name`, in insertion order.
    pub fn members(&self, name: &str) -> Vec<(String, u64)> {
        self.namespaces
            .iter()
            .find(|ns| ns.handle.name == name)
            .map(|ns| ns.members.clone())
            .unwrap_or_default()
    }

    pub fn namespaces(&self) -> Vec<NamespaceHandle> {
        self.namespaces.iter().map(|ns| ns.handle.clone()).collect()
    }

    /// Names set on addresses through [`Host::set_name`].
    pub fn names(&self) -> &BTreeMap<u64, String> {
        &self.names
    }

    pub fn converted(&self) -> &[(u64, u8)] {
        &self.converted
    }

    pub fn choice_prompts(&self) -> &[Vec<String>] {
        &self.choice_prompts
    }

    pub fn replacement_prompts(&self) -> &[(String, Vec<usize>)] {
        &self.replacement_prompts
    }

    pub fn module_prompts(&self) -> &[(String, Vec<String>)] {
        &self.module_prompts
    }

    pub fn settings_prompts(&self) -> &[Vec<Algorithm>] {
        &self.settings_prompts
    }

    pub fn hunt_prompts(&self) -> &[Vec<HuntCandidate>] {
        &self.hunt_prompts
    }

    fn namespace_mut(&mut self, handle: &NamespaceHandle) -> Result<&mut MockNamespace> {
        self.namespaces
            .iter_mut()
            .find(|ns| ns.handle.id == handle.id)
            .ok_or_else(|| {
                HashDbError::HostOperationFailed(format!("unknown namespace {}", handle.name))
            })
    }
}

impl Host for MockHost {
    fn read_highlighted_or_selected_value(&mut self) -> Option<HighlightedValue> {
        self.highlighted
    }

    fn read_selected_address_range(&mut self) -> Option<(u64, u64)> {
        self.range
    }

    fn guess_type_width(&mut self, address: u64) -> Option<u8> {
        self.type_widths.get(&address).copied()
    }

    fn read_integer(&mut self, address: u64, width: u8) -> Result<u64> {
        let out_of_range = || {
            HashDbError::HostOperationFailed(format!(
                "cannot read {} bytes at {:#x}",
                width, address
            ))
        };
        let offset = address
            .checked_sub(self.memory_base)
            .and_then(|o| usize::try_from(o).ok())
            .ok_or_else(out_of_range)?;
        let bytes = self
            .memory
            .get(offset..offset.saturating_add(usize::from(width)))
            .ok_or_else(out_of_range)?;

        Ok(bytes
            .iter()
            .rev()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    fn create_or_find_namespace(&mut self, name: &str, width_bytes: u8) -> Result<NamespaceHandle> {
        if let Some(ns) = self.namespaces.iter().find(|ns| ns.handle.name == name) {
            return Ok(ns.handle.clone());
        }
        let handle = NamespaceHandle {
            id: self.namespaces.len() as u64 + 1,
            name: name.to_string(),
            width_bytes,
        };
        self.namespaces.push(MockNamespace {
            handle: handle.clone(),
            members: Vec::new(),
        });
        Ok(handle)
    }

    fn insert_member(
        &mut self,
        namespace: &NamespaceHandle,
        name: &str,
        value: u64,
    ) -> Result<InsertResult> {
        let reserved = self.reserved_names.contains(name) || self.names.values().any(|n| n == name);
        let id = namespace.id;
        let elsewhere = self
            .namespaces
            .iter()
            .filter(|ns| ns.handle.id != id)
            .any(|ns| ns.members.iter().any(|(n, _)| n == name));
        let limit = self.value_limit;

        let ns = self.namespace_mut(namespace)?;
        if ns.members.iter().any(|(n, v)| n == name && *v == value) {
            return Ok(InsertResult::Ok);
        }
        if reserved || elsewhere || ns.members.iter().any(|(n, _)| n == name) {
            return Ok(InsertResult::NameTaken);
        }
        if ns.members.iter().filter(|(_, v)| *v == value).count() >= limit {
            return Ok(InsertResult::ValueLimitReached);
        }
        ns.members.push((name.to_string(), value));
        Ok(InsertResult::Ok)
    }

    fn apply_label(
        &mut self,
        namespace: &NamespaceHandle,
        address: u64,
        value: &EnumValue,
        width: u8,
    ) -> Result<()> {
        self.labels.push(RecordedLabel {
            namespace: namespace.name.clone(),
            address,
            name: value.name.clone(),
            value: value.value,
            width,
            is_api: value.is_api,
        });
        Ok(())
    }

    fn convert_storage(&mut self, address: u64, width: u8) -> Result<()> {
        self.converted.push((address, width));
        Ok(())
    }

    fn name_exists(&mut self, name: &str) -> bool {
        self.reserved_names.contains(name)
            || self.names.values().any(|n| n == name)
            || self
                .namespaces
                .iter()
                .any(|ns| ns.members.iter().any(|(n, _)| n == name))
    }

    fn set_name(&mut self, address: u64, name: &str) -> Result<()> {
        self.names.insert(address, name.to_string());
        Ok(())
    }

    fn prompt_choice(&mut self, _title: &str, options: &[String]) -> Option<String> {
        self.choice_prompts.push(options.to_vec());
        self.choices.pop_front().flatten()
    }

    fn prompt_text_replacement(
        &mut self,
        original: &str,
        invalid_positions: &[usize],
    ) -> Option<String> {
        self.replacement_prompts
            .push((original.to_string(), invalid_positions.to_vec()));
        self.replacements.pop_front().flatten()
    }

    fn prompt_module_import(&mut self, api_name: &str, modules: &[String]) -> Option<String> {
        self.module_prompts
            .push((api_name.to_string(), modules.to_vec()));
        self.module_imports.pop_front().flatten()
    }

    fn prompt_settings(&mut self, _current: &Settings, algorithms: &[Algorithm]) -> Option<Settings> {
        self.settings_prompts.push(algorithms.to_vec());
        self.settings_answers.pop_front().flatten()
    }

    fn prompt_hunt_selection(&mut self, candidates: &[HuntCandidate]) -> Option<usize> {
        self.hunt_prompts.push(candidates.to_vec());
        self.hunt_selections.pop_front().flatten()
    }

    fn message(&mut self, text: &str) {
        self.messages.push(text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_integer_little_endian() {
        let mut host = MockHost::new().with_memory(0x1000, &[0x6a, 0x4b, 0x8a, 0x62, 0xff]);
        assert_eq!(host.read_integer(0x1000, 4).unwrap(), 0x628a4b6a);
        assert_eq!(host.read_integer(0x1004, 1).unwrap(), 0xff);
        assert!(host.read_integer(0x1002, 4).is_err());
        assert!(host.read_integer(0x0fff, 1).is_err());
    }

    #[test]
    fn test_insert_member_rules() {
        let mut host = MockHost::new().with_value_limit(1);
        let ns = host.create_or_find_namespace("ns", 4).unwrap();
        assert_eq!(host.create_or_find_namespace("ns", 4).unwrap(), ns);

        assert_eq!(host.insert_member(&ns, "a", 1).unwrap(), InsertResult::Ok);
        assert_eq!(host.insert_member(&ns, "a", 1).unwrap(), InsertResult::Ok);
        assert_eq!(host.insert_member(&ns, "a", 2).unwrap(), InsertResult::NameTaken);
        assert_eq!(
            host.insert_member(&ns, "b", 1).unwrap(),
            InsertResult::ValueLimitReached
        );
        assert_eq!(host.members("ns"), vec![("a".to_string(), 1)]);
    }
}
