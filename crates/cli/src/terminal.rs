//! A [`Host`] backed by a terminal and a raw memory image.

use std::collections::BTreeMap;
use std::io::{BufRead, Write};

use hashdb_core::{
    parse_integer_literal, Algorithm, EnumValue, HashDbError, HighlightedValue, Host,
    HuntCandidate, InsertResult, NamespaceHandle, Result, Settings,
};

struct Namespace {
    handle: NamespaceHandle,
    members: Vec<(String, u64)>,
}

/// Terminal host: prompts on `output`, answers from `input`.
///
/// An empty answer cancels a prompt.
pub struct TerminalHost<R, W> {
    input: R,
    output: W,
    highlighted: Option<HighlightedValue>,
    range: Option<(u64, u64)>,
    image_base: u64,
    image: Vec<u8>,
    namespaces: Vec<Namespace>,
    names: BTreeMap<u64, String>,
    labels: BTreeMap<u64, String>,
}

impl<R: BufRead, W: Write> TerminalHost<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            highlighted: None,
            range: None,
            image_base: 0,
            image: Vec::new(),
            namespaces: Vec::new(),
            names: BTreeMap::new(),
            labels: BTreeMap::new(),
        }
    }

    /// Treat `value` as the highlighted operand.
    pub fn highlight(&mut self, value: u64, address: Option<u64>) {
        self.highlighted = Some(HighlightedValue { address, value });
    }

    /// Map `image` at `base` and select `[start, end)`.
    pub fn load_image(&mut self, base: u64, image: Vec<u8>, start: u64, end: u64) {
        self.image_base = base;
        self.image = image;
        self.range = Some((start, end));
    }

    /// Print every namespace member, label and name set during the run.
    pub fn print_summary(&mut self) -> std::io::Result<()> {
        for ns in &self.namespaces {
            writeln!(self.output, "enum {} ({} bytes)", ns.handle.name, ns.handle.width_bytes)?;
            for (name, value) in &ns.members {
                writeln!(self.output, "    {} = {:#x}", name, value)?;
            }
        }
        for (address, label) in &self.labels {
            match self.names.get(address) {
                Some(name) => writeln!(self.output, "{:#x}: {} ({})", address, label, name)?,
                None => writeln!(self.output, "{:#x}: {}", address, label)?,
            }
        }
        self.output.flush()
    }

    fn ask(&mut self, question: &str) -> Option<String> {
        write!(self.output, "{}: ", question).ok()?;
        self.output.flush().ok()?;

        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()).filter(|l| !l.is_empty()),
        }
    }

    /// Numbered menu; returns the picked index.
    fn pick(&mut self, title: &str, options: &[String]) -> Option<usize> {
        let _ = writeln!(self.output, "{}", title);
        for (i, option) in options.iter().enumerate() {
            let _ = writeln!(self.output, "  [{}] {}", i + 1, option);
        }

        loop {
            let answer = self.ask("Choice (empty to cancel)")?;
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Some(n - 1),
                _ => {
                    let _ = writeln!(self.output, "Enter a number between 1 and {}", options.len());
                }
            }
        }
    }

    fn find_namespace(&mut self, handle: &NamespaceHandle) -> Result<&mut Namespace> {
        self.namespaces
            .iter_mut()
            .find(|ns| ns.handle.id == handle.id)
            .ok_or_else(|| {
                HashDbError::HostOperationFailed(format!("unknown enum {}", handle.name))
            })
    }
}

impl<R: BufRead, W: Write> Host for TerminalHost<R, W> {
    fn read_highlighted_or_selected_value(&mut self) -> Option<HighlightedValue> {
        self.highlighted
    }

    fn read_selected_address_range(&mut self) -> Option<(u64, u64)> {
        self.range
    }

    fn guess_type_width(&mut self, _address: u64) -> Option<u8> {
        None
    }

    fn read_integer(&mut self, address: u64, width: u8) -> Result<u64> {
        let unreadable = || {
            HashDbError::HostOperationFailed(format!(
                "cannot read {} bytes at {:#x}",
                width, address
            ))
        };
        let offset = address
            .checked_sub(self.image_base)
            .and_then(|o| usize::try_from(o).ok())
            .ok_or_else(unreadable)?;
        let bytes = self
            .image
            .get(offset..offset.saturating_add(usize::from(width)))
            .ok_or_else(unreadable)?;

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
            id: self.namespaces.len() as u64,
            name: name.to_string(),
            width_bytes,
        };
        self.namespaces.push(Namespace {
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
        let id = namespace.id;
        let used_elsewhere = self.names.values().any(|n| n == name)
            || self
                .namespaces
                .iter()
                .filter(|ns| ns.handle.id != id)
                .any(|ns| ns.members.iter().any(|(n, _)| n == name));

        let ns = self.find_namespace(namespace)?;
        if let Some((_, existing)) = ns.members.iter().find(|(n, _)| n == name) {
            return Ok(if *existing == value {
                InsertResult::Ok
            } else {
                InsertResult::NameTaken
            });
        }
        if used_elsewhere {
            return Ok(InsertResult::NameTaken);
        }
        ns.members.push((name.to_string(), value));
        Ok(InsertResult::Ok)
    }

    fn apply_label(
        &mut self,
        namespace: &NamespaceHandle,
        address: u64,
        value: &EnumValue,
        _width: u8,
    ) -> Result<()> {
        self.labels
            .insert(address, format!("{}.{}", namespace.name, value.name));
        Ok(())
    }

    fn convert_storage(&mut self, _address: u64, _width: u8) -> Result<()> {
        Ok(())
    }

    fn name_exists(&mut self, name: &str) -> bool {
        self.names.values().any(|n| n == name)
            || self
                .namespaces
                .iter()
                .any(|ns| ns.members.iter().any(|(n, _)| n == name))
    }

    fn set_name(&mut self, address: u64, name: &str) -> Result<()> {
        self.names.insert(address, name.to_string());
        Ok(())
    }

    fn prompt_choice(&mut self, title: &str, options: &[String]) -> Option<String> {
        let index = self.pick(title, options)?;
        options.get(index).cloned()
    }

    fn prompt_text_replacement(
        &mut self,
        original: &str,
        invalid_positions: &[usize],
    ) -> Option<String> {
        let marker: String = (0..original.chars().count())
            .map(|i| if invalid_positions.contains(&i) { '^' } else { ' ' })
            .collect();
        let _ = writeln!(self.output, "Invalid name:\n  {}\n  {}", original, marker);
        self.ask("Replacement (empty to skip)")
    }

    fn prompt_module_import(&mut self, api_name: &str, modules: &[String]) -> Option<String> {
        let title = format!(
            "{} is an API hash. Import every hash from one of its modules?",
            api_name
        );
        let index = self.pick(&title, modules)?;
        modules.get(index).cloned()
    }

    fn prompt_settings(&mut self, current: &Settings, algorithms: &[Algorithm]) -> Option<Settings> {
        let options: Vec<String> = algorithms
            .iter()
            .map(|a| format!("{} ({} bits) {}", a.name, a.size_bits, a.description))
            .collect();
        let index = self.pick("Select a hash algorithm", &options)?;

        let mut settings = current.clone();
        settings.selected_algorithm = algorithms.get(index).cloned();

        let question = format!("XOR key ({:#x}, 0 disables)", current.xor_value);
        if let Some(answer) = self.ask(&question) {
            match parse_integer_literal(&answer) {
                Ok(key) => {
                    settings.xor_enabled = key != 0;
                    settings.xor_value = key;
                }
                Err(e) => {
                    let _ = writeln!(self.output, "{}", e);
                    return None;
                }
            }
        }
        Some(settings)
    }

    fn prompt_hunt_selection(&mut self, candidates: &[HuntCandidate]) -> Option<usize> {
        let options: Vec<String> = candidates
            .iter()
            .map(|c| {
                format!(
                    "{} ({} bits) hitrate {:.2}, count {}",
                    c.algorithm.name, c.algorithm.size_bits, c.hitrate, c.count
                )
            })
            .collect();
        self.pick("Matching algorithms", &options)
    }

    fn message(&mut self, text: &str) {
        let _ = writeln!(self.output, "{}", text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn host(input: &str) -> TerminalHost<Cursor<Vec<u8>>, Vec<u8>> {
        TerminalHost::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    fn output(host: &TerminalHost<Cursor<Vec<u8>>, Vec<u8>>) -> String {
        String::from_utf8_lossy(&host.output).into_owned()
    }

    #[test]
    fn test_choice_retries_until_valid() {
        let mut host = host("7\n2\n");
        let options = vec!["foo".to_string(), "bar".to_string()];
        assert_eq!(
            host.prompt_choice("Select the best hash match", &options),
            Some("bar".to_string())
        );
        assert!(output(&host).contains("Enter a number between 1 and 2"));
    }

    #[test]
    fn test_empty_answer_cancels() {
        let mut host = host("\n");
        let options = vec!["foo".to_string()];
        assert_eq!(host.prompt_choice("title", &options), None);
        assert_eq!(host.prompt_text_replacement("a b", &[1]), None);
    }

    #[test]
    fn test_prompt_settings_reads_xor_key() {
        let mut host = host("1\n0x1234\n");
        let algorithms = vec![Algorithm {
            name: "crc32".to_string(),
            description: "Standard crc32 hash.".to_string(),
            size_bits: 32,
        }];

        let settings = host
            .prompt_settings(&Settings::default(), &algorithms)
            .unwrap();
        assert_eq!(settings.selected_algorithm, algorithms.first().cloned());
        assert!(settings.xor_enabled);
        assert_eq!(settings.xor_value, 0x1234);
    }

    #[test]
    fn test_insert_member_and_summary() {
        let mut host = host("");
        let ns = host.create_or_find_namespace("hashdb_strings_crc32", 4).unwrap();
        assert_eq!(host.insert_member(&ns, "Sleep", 1).unwrap(), InsertResult::Ok);
        assert_eq!(host.insert_member(&ns, "Sleep", 1).unwrap(), InsertResult::Ok);
        assert_eq!(
            host.insert_member(&ns, "Sleep", 2).unwrap(),
            InsertResult::NameTaken
        );

        let value = EnumValue {
            name: "Sleep".to_string(),
            value: 1,
            is_api: true,
        };
        host.apply_label(&ns, 0x401000, &value, 4).unwrap();
        host.print_summary().unwrap();

        let text = output(&host);
        assert!(text.contains("enum hashdb_strings_crc32 (4 bytes)"));
        assert!(text.contains("    Sleep = 0x1"));
        assert!(text.contains("0x401000: hashdb_strings_crc32.Sleep"));
    }

    #[test]
    fn test_read_integer_from_image() {
        let mut host = host("");
        host.load_image(0x400000, vec![0x59, 0x2a, 0xba, 0xb2], 0x400000, 0x400004);
        assert_eq!(host.read_integer(0x400000, 4).unwrap(), 0xb2ba2a59);
        assert!(host.read_integer(0x400002, 4).is_err());
    }
}
