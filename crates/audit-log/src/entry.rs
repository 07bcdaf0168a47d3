use chrono::{DateTime, Utc};
use policy_engine::{Action, Decision, Mode, Scheme};
use serde::{Deserialize, Serialize};

/// One egress decision as persisted in the decision log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub action: Action,
    pub destination: String,
    pub scheme: Scheme,
    pub rule_name: String,
    /// True when no explicit rule covered the destination (default or HTTP
    /// policy decided).
    #[serde(default)]
    pub default: bool,
    /// True when a path-scoped rule let a TLS connection through undecided.
    #[serde(default)]
    pub deferred: bool,
    pub mode: Mode,
    pub timestamp: DateTime<Utc>,
}

impl DecisionRecord {
    /// Build a record for `decision`, stamped with the current UTC time.
    pub fn new(decision: &Decision, mode: Mode) -> Self {
        Self {
            action: decision.action,
            destination: decision.destination.clone(),
            scheme: decision.scheme,
            rule_name: decision.rule_name.clone(),
            default: decision.is_default(),
            deferred: decision.is_deferred(),
            mode,
            timestamp: Utc::now(),
        }
    }

    pub fn is_block(&self) -> bool {
        self.action == Action::Block
    }
}
