use regex::Regex;
use tracing::warn;

use crate::matcher::{compile_glob, normalize_destination};
use crate::schema::{RawRule, RuleAction};

/// A path glob compiled against the complete request path.
#[derive(Debug, Clone)]
pub struct CompiledPath {
    pub pattern: String,
    regex: Regex,
}

impl CompiledPath {
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// A validated egress rule with pre-compiled matchers.
///
/// Immutable after compilation. Rules live in a `Vec` whose order is the
/// evaluation priority: the first matching rule wins.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub name: String,
    pub description: Option<String>,
    /// Normalized host glob.
    pub destination: String,
    pub action: RuleAction,
    domain: Regex,
    paths: Vec<CompiledPath>,
}

impl CompiledRule {
    /// Whether `domain` (already lowercase) matches the destination glob in full.
    pub fn matches_domain(&self, domain: &str) -> bool {
        self.domain.is_match(domain)
    }

    /// Whether the rule only applies to specific request paths.
    pub fn is_path_scoped(&self) -> bool {
        !self.paths.is_empty()
    }

    pub fn paths(&self) -> &[CompiledPath] {
        &self.paths
    }

    pub fn blocks(&self) -> bool {
        self.action == RuleAction::Block
    }
}

/// Validate and compile an ordered list of raw rules.
///
/// Never fails as a whole. Rules missing `name`, `destination` or `action`
/// are skipped with a warning; an unknown action becomes `allow` with a
/// warning. The output preserves input order.
pub fn compile_rules(raw: &[RawRule]) -> Vec<CompiledRule> {
    raw.iter()
        .enumerate()
        .filter_map(|(index, rule)| compile_rule(index, rule))
        .collect()
}

fn compile_rule(index: usize, raw: &RawRule) -> Option<CompiledRule> {
    let (name, destination, action) = match (
        non_empty(&raw.name),
        non_empty(&raw.destination),
        non_empty(&raw.action),
    ) {
        (Some(name), Some(destination), Some(action)) => (name, destination, action),
        _ => {
            warn!(
                index,
                rule = ?raw,
                "invalid egress rule: every rule needs 'name', 'destination' and 'action'; skipping"
            );
            return None;
        }
    };

    let action = match action.to_lowercase().as_str() {
        "allow" => RuleAction::Allow,
        "block" => RuleAction::Block,
        other => {
            warn!(
                rule = name,
                action = other,
                "invalid egress rule action (expected 'allow' or 'block'); defaulting to allow"
            );
            RuleAction::Allow
        }
    };

    let destination = normalize_destination(destination);
    let domain = match compile_glob(&destination) {
        Ok(re) => re,
        Err(err) => {
            warn!(rule = name, %destination, error = %err, "failed to compile destination; skipping rule");
            return None;
        }
    };

    let paths = raw
        .paths
        .iter()
        .flatten()
        .filter_map(|pattern| match compile_glob(pattern) {
            Ok(regex) => Some(CompiledPath {
                pattern: pattern.clone(),
                regex,
            }),
            Err(err) => {
                warn!(rule = name, %pattern, error = %err, "failed to compile path pattern; ignoring it");
                None
            }
        })
        .collect();

    Some(CompiledRule {
        name: name.to_string(),
        description: raw.description.clone(),
        destination,
        action,
        domain,
        paths,
    })
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
