//! Identifier repair and unique member insertion.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::host::{EnumValue, Host, InsertResult, NamespaceHandle};

/// Names tried per entry (`name`, `name_0` … `name_254`) before giving up.
pub const MAX_NAME_ATTEMPTS: usize = 256;

/// What happened to one entry handed to [`add_enum_value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberOutcome {
    /// Inserted (or already present) under `name`.
    Inserted { name: String },
    /// The user declined to repair an invalid name.
    Skipped { original: String },
    /// No free name was found, or the host refused more members for the value.
    Abandoned { name: String },
}

impl MemberOutcome {
    pub fn inserted_name(&self) -> Option<&str> {
        match self {
            MemberOutcome::Inserted { name } => Some(name),
            _ => None,
        }
    }
}

/// Replace whitespace and `.` with `_`.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() || c == '.' { '_' } else { c })
        .collect()
}

/// Char indices that make `name` an invalid identifier.
pub fn invalid_positions(name: &str, is_ident_char: impl Fn(char) -> bool) -> Vec<usize> {
    name.chars()
        .enumerate()
        .filter(|&(i, c)| !is_ident_char(c) || (i == 0 && c.is_ascii_digit()))
        .map(|(i, _)| i)
        .collect()
}

/// Normalize `name` and ask the user to fix it until it is a valid identifier.
///
/// Returns `None` when the user cancels or submits an empty replacement.
pub fn repair_name(host: &mut dyn Host, name: &str) -> Option<String> {
    let mut candidate = normalize_name(name);

    loop {
        let positions = invalid_positions(&candidate, |c| host.is_ident_char(c));
        if !candidate.is_empty() && positions.is_empty() {
            return Some(candidate);
        }

        debug!(name = %candidate, ?positions, "Name is not a valid identifier");
        match host.prompt_text_replacement(&candidate, &positions) {
            Some(reply) if !reply.trim().is_empty() => {
                candidate = normalize_name(reply.trim());
            }
            _ => {
                info!("Skipping hash result {:?}", name);
                return None;
            }
        }
    }
}

/// Insert `name = value`, suffixing `_0`, `_1`, … while the name is taken.
pub fn insert_unique(
    host: &mut dyn Host,
    namespace: &NamespaceHandle,
    name: &str,
    value: u64,
) -> Result<MemberOutcome> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = match attempt {
            0 => name.to_string(),
            n => format!("{}_{}", name, n - 1),
        };

        match host.insert_member(namespace, &candidate, value)? {
            InsertResult::Ok => {
                debug!(namespace = %namespace.name, name = %candidate, value, "Member inserted");
                return Ok(MemberOutcome::Inserted { name: candidate });
            }
            InsertResult::NameTaken => continue,
            InsertResult::ValueLimitReached => {
                warn!(
                    "Namespace {} cannot hold more members with value {:#x}; dropping {}",
                    namespace.name, value, name
                );
                return Ok(MemberOutcome::Abandoned {
                    name: name.to_string(),
                });
            }
        }
    }

    warn!(
        "No free name for {} after {} attempts; dropping it",
        name, MAX_NAME_ATTEMPTS
    );
    Ok(MemberOutcome::Abandoned {
        name: name.to_string(),
    })
}

/// Repair the name of `value` and insert it into `namespace`.
///
/// Skipped and abandoned entries are reported through [`Host::message`].
pub fn add_enum_value(
    host: &mut dyn Host,
    namespace: &NamespaceHandle,
    value: &EnumValue,
) -> Result<MemberOutcome> {
    match repair_name(host, &value.name) {
        Some(name) => {
            let outcome = insert_unique(host, namespace, &name, value.value)?;
            if let MemberOutcome::Abandoned { name } = &outcome {
                host.message(&format!(
                    "ERROR: Unable to add {} to enum: {}",
                    name, namespace.name
                ));
            }
            Ok(outcome)
        }
        None => {
            host.message(&format!(
                "HashDB: Skipping hash result \"{}\" with value: {:#x}",
                value.name, value.value
            ));
            Ok(MemberOutcome::Skipped {
                original: value.name.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::default_is_ident_char;
    use crate::testing::MockHost;

    fn namespace(host: &mut MockHost) -> NamespaceHandle {
        host.create_or_find_namespace("hashdb_strings_crc32", 4)
            .unwrap()
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("kernel32.dll"), "kernel32_dll");
        assert_eq!(normalize_name("Sleep Ex\tA"), "Sleep_Ex_A");
    }

    #[test]
    fn test_invalid_positions() {
        assert!(invalid_positions("RouteTheCall", default_is_ident_char).is_empty());
        assert_eq!(invalid_positions("1a-b", default_is_ident_char), vec![0, 2]);
        assert_eq!(invalid_positions("a1", default_is_ident_char), Vec::<usize>::new());
    }

    #[test]
    fn test_repair_valid_name_never_prompts() {
        let mut host = MockHost::new();
        assert_eq!(
            repair_name(&mut host, "LoadLibraryA"),
            Some("LoadLibraryA".to_string())
        );
        assert!(host.replacement_prompts().is_empty());
    }

    #[test]
    fn test_repair_loops_until_valid() {
        let mut host = MockHost::new()
            .with_replacement(Some("still-bad".to_string()))
            .with_replacement(Some("nine lives".to_string()));

        assert_eq!(
            repair_name(&mut host, "9lives"),
            Some("nine_lives".to_string())
        );
        let prompts = host.replacement_prompts();
        assert_eq!(prompts.len(), 2);
        assert_eq!(prompts[0], ("9lives".to_string(), vec![0]));
        assert_eq!(prompts[1], ("still-bad".to_string(), vec![5]));
    }

    #[test]
    fn test_repair_cancel_or_empty_skips() {
        let mut host = MockHost::new().with_replacement(None);
        assert_eq!(repair_name(&mut host, "a-b"), None);

        let mut host = MockHost::new().with_replacement(Some("   ".to_string()));
        assert_eq!(repair_name(&mut host, "a-b"), None);
    }

    #[test]
    fn test_insert_unique_suffixes() {
        let mut host = MockHost::new().with_reserved_name("Sleep");
        let ns = namespace(&mut host);

        let outcome = insert_unique(&mut host, &ns, "Sleep", 1).unwrap();
        assert_eq!(outcome.inserted_name(), Some("Sleep_0"));

        let outcome = insert_unique(&mut host, &ns, "Sleep", 2).unwrap();
        assert_eq!(outcome.inserted_name(), Some("Sleep_1"));

        // Same name and value again is not a conflict.
        let outcome = insert_unique(&mut host, &ns, "Sleep_0", 1).unwrap();
        assert_eq!(outcome.inserted_name(), Some("Sleep_0"));
    }

    #[test]
    fn test_insert_unique_gives_up_after_max_attempts() {
        let mut host = MockHost::new().with_reserved_name("x");
        for i in 0..MAX_NAME_ATTEMPTS {
            host = host.with_reserved_name(&format!("x_{}", i));
        }
        let ns = namespace(&mut host);

        let outcome = insert_unique(&mut host, &ns, "x", 7).unwrap();
        assert_eq!(
            outcome,
            MemberOutcome::Abandoned {
                name: "x".to_string()
            }
        );
        assert!(host.members(&ns.name).is_empty());
    }

    #[test]
    fn test_add_enum_value_reports_skip() {
        let mut host = MockHost::new().with_replacement(None);
        let ns = namespace(&mut host);
        let value = EnumValue {
            name: "3bad".to_string(),
            value: 5,
            is_api: false,
        };

        let outcome = add_enum_value(&mut host, &ns, &value).unwrap();
        assert!(matches!(outcome, MemberOutcome::Skipped { .. }));
        assert!(host.messages()[0].contains("Skipping hash result"));
    }

    #[test]
    fn test_value_limit_abandons_entry_and_batch_continues() {
        let mut host = MockHost::new().with_value_limit(1);
        let ns = namespace(&mut host);
        let entries = [("first", 1), ("second", 1), ("third", 2)];

        let outcomes: Vec<MemberOutcome> = entries
            .iter()
            .map(|(name, value)| {
                let value = EnumValue {
                    name: name.to_string(),
                    value: *value,
                    is_api: false,
                };
                add_enum_value(&mut host, &ns, &value).unwrap()
            })
            .collect();

        assert_eq!(outcomes[0].inserted_name(), Some("first"));
        assert_eq!(
            outcomes[1],
            MemberOutcome::Abandoned {
                name: "second".to_string()
            }
        );
        assert_eq!(outcomes[2].inserted_name(), Some("third"));
        assert_eq!(
            host.members(&ns.name),
            vec![("first".to_string(), 1), ("third".to_string(), 2)]
        );
        assert_eq!(
            host.messages(),
            ["ERROR: Unable to add second to enum: hashdb_strings_crc32".to_string()]
        );
    }
}
