use serde::{Deserialize, Serialize};

use crate::schema::Scheme;

/// Rule name reported when plaintext HTTP is refused by configuration.
pub const HTTP_POLICY_RULE_NAME: &str = "allow_http is False";

/// Outcome of evaluating one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    Block,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Block => "block",
        }
    }
}

/// What produced a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionSource {
    /// An explicit egress rule, by name.
    Rule(String),
    /// No rule matched; the default policy applied.
    DefaultPolicy,
    /// Plaintext HTTP is disallowed, independent of the rule list.
    HttpPolicy,
    /// A path-scoped rule matched a TLS connection. Paths are not visible
    /// inside TLS, so the connection proceeds without a connection-level
    /// decision.
    Deferred(String),
}

/// A single allow/block decision for a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub source: DecisionSource,
    /// Name reported for the decision: the rule name, or a synthesized name
    /// for the default / HTTP policy.
    pub rule_name: String,
    pub destination: String,
    pub scheme: Scheme,
}

impl Decision {
    /// Record of a TLS connection let through because `rule` is path-scoped.
    pub fn deferred(rule: impl Into<String>, destination: impl Into<String>, scheme: Scheme) -> Self {
        let rule = rule.into();
        Self {
            action: Action::Allow,
            rule_name: rule.clone(),
            source: DecisionSource::Deferred(rule),
            destination: destination.into(),
            scheme,
        }
    }

    pub fn is_block(&self) -> bool {
        self.action == Action::Block
    }

    /// Name of the explicit rule that matched, `None` for policy fallbacks.
    pub fn matched_rule(&self) -> Option<&str> {
        match &self.source {
            DecisionSource::Rule(name) | DecisionSource::Deferred(name) => Some(name),
            DecisionSource::DefaultPolicy | DecisionSource::HttpPolicy => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self.source, DecisionSource::Deferred(_))
    }

    /// Whether no explicit rule covered the destination.
    pub fn is_default(&self) -> bool {
        self.matched_rule().is_none()
    }
}

/// What the interception layer must do with the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforcement {
    /// Let the traffic through.
    Pass,
    /// Sever before any payload reaches the network.
    Terminate,
}

/// A decision paired with the enforcement it requires in the current mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub enforcement: Enforcement,
}

impl Verdict {
    pub fn terminates(&self) -> bool {
        self.enforcement == Enforcement::Terminate
    }
}

/// Result of the pre-connection (TLS handshake) evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsVerdict {
    /// The first matching rule is path-scoped: only per-request evaluation
    /// can decide, so the connection proceeds undecided.
    Deferred { rule: String },
    Decided(Verdict),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(source: DecisionSource) -> Decision {
        Decision {
            action: Action::Block,
            source,
            rule_name: "r".into(),
            destination: "x.com".into(),
            scheme: Scheme::Https,
        }
    }

    #[test]
    fn matched_rule_only_for_explicit_rules() {
        assert_eq!(
            decision(DecisionSource::Rule("r".into())).matched_rule(),
            Some("r")
        );
        assert!(decision(DecisionSource::DefaultPolicy).is_default());
        assert!(decision(DecisionSource::HttpPolicy).is_default());
    }

    #[test]
    fn deferred_decision_names_its_rule() {
        let d = Decision::deferred("metadata paths", "api.example.com", Scheme::Https);
        assert!(d.is_deferred());
        assert!(!d.is_default());
        assert!(!d.is_block());
        assert_eq!(d.matched_rule(), Some("metadata paths"));
        assert_eq!(d.rule_name, "metadata paths");
    }

    #[test]
    fn action_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Action::Block).unwrap(), "\"block\"");
    }
}
