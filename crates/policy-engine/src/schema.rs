use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Enforcement mode of the egress proxy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Record decisions but never terminate a connection.
    #[default]
    Audit,
    /// Terminate connections and requests decided as blocked.
    Active,
}

impl Mode {
    /// Parse an operator-supplied mode value.
    ///
    /// Anything other than `audit` / `active` (case-insensitive) falls back
    /// to [`Mode::Audit`] with a warning.
    pub fn from_input(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "audit" => Mode::Audit,
            "active" => Mode::Active,
            other => {
                warn!(value = other, "invalid mode value; defaulting to audit");
                Mode::Audit
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Audit => "audit",
            Mode::Active => "active",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fallback action when no rule matches a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultPolicy {
    AllowAll,
    #[default]
    BlockAll,
}

impl DefaultPolicy {
    /// Parse an operator-supplied default policy, falling back to
    /// [`DefaultPolicy::BlockAll`] with a warning.
    pub fn from_input(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "allow-all" => DefaultPolicy::AllowAll,
            "block-all" => DefaultPolicy::BlockAll,
            other => {
                warn!(
                    value = other,
                    "invalid default_policy value; defaulting to block-all"
                );
                DefaultPolicy::BlockAll
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DefaultPolicy::AllowAll => "allow-all",
            DefaultPolicy::BlockAll => "block-all",
        }
    }

    /// Rule name reported when this policy decided a connection.
    pub fn rule_name(&self) -> String {
        format!("Default Policy - {}", self.as_str())
    }
}

impl fmt::Display for DefaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a boolean operator flag (`true` / `false`, case-insensitive).
///
/// Invalid values fall back to `default` with a warning naming the flag.
pub fn parse_flag(name: &str, input: &str, default: bool) -> bool {
    match input.trim().to_lowercase().as_str() {
        "true" => true,
        "false" => false,
        other => {
            warn!(flag = name, value = other, default, "invalid flag value; using default");
            default
        }
    }
}

/// URL scheme of an intercepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated action of an egress rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Block,
}

/// A rule exactly as the operator wrote it.
///
/// Every field is optional so that one malformed entry never prevents the
/// rest of the list from loading; validation happens once, in
/// [`compile_rules`](crate::compile_rules).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRule {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Host glob. `domain` is accepted for compatibility with older rule files.
    #[serde(default, alias = "domain")]
    pub destination: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
}

/// Immutable settings shared by every evaluation for the lifetime of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EgressSettings {
    pub mode: Mode,
    pub default_policy: DefaultPolicy,
    pub allow_http: bool,
}
