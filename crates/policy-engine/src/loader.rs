use std::path::Path;

use anyhow::{Context, Result};
use serde_yml::Value;
use tracing::{error, warn};

use crate::schema::RawRule;

/// Load an egress rule list from a YAML file on disk.
///
/// Only I/O failures are errors; content problems degrade as described in
/// [`parse_rules`].
pub fn load_rules(path: impl AsRef<Path>) -> Result<Vec<RawRule>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read egress rules file: {}", path.display()))?;
    Ok(parse_rules(&contents))
}

/// Parse an egress rule list from YAML text.
///
/// The document must be a sequence of mappings. Invalid YAML, or a document
/// that is not a sequence, yields an empty list so that the default policy
/// governs everything. Individual entries that cannot be read as a rule are
/// skipped with a warning.
pub fn parse_rules(yaml: &str) -> Vec<RawRule> {
    let document: Value = match serde_yml::from_str(yaml) {
        Ok(value) => value,
        Err(err) => {
            error!(error = %err, "invalid YAML in egress rules; skipping all egress rules");
            return Vec::new();
        }
    };

    let entries = match document {
        Value::Sequence(entries) => entries,
        Value::Null => return Vec::new(),
        other => {
            error!(
                document = ?other,
                "egress rules must be a list of rules; skipping all egress rules"
            );
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_yml::from_value::<RawRule>(entry) {
            Ok(rule) => Some(rule),
            Err(err) => {
                warn!(index, error = %err, "unreadable egress rule; skipping");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rule_list_in_order() {
        let rules = parse_rules(
            r#"
- name: "first"
  destination: "a.com"
  action: "allow"
- name: "second"
  destination: "*.b.com"
  paths: ["/x/*"]
  action: "block"
"#,
        );
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name.as_deref(), Some("first"));
        assert_eq!(rules[1].paths.as_deref(), Some(&["/x/*".to_string()][..]));
    }

    #[test]
    fn invalid_yaml_yields_empty_list() {
        assert!(parse_rules("- name: [unterminated").is_empty());
    }

    #[test]
    fn non_sequence_yields_empty_list() {
        assert!(parse_rules("name: lonely-rule\naction: allow").is_empty());
    }

    #[test]
    fn empty_input_yields_empty_list() {
        assert!(parse_rules("").is_empty());
    }

    #[test]
    fn unreadable_entries_are_skipped() {
        let rules = parse_rules(
            r#"
- 42
- name: "ok"
  destination: "a.com"
  action: "allow"
- paths: "not-a-list"
"#,
        );
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name.as_deref(), Some("ok"));
    }

    #[test]
    fn load_from_nonexistent_file() {
        let err = load_rules("/does/not/exist.yaml").unwrap_err();
        assert!(
            err.to_string().contains("failed to read egress rules file"),
            "unexpected error: {err}"
        );
    }
}
