use tracing::{debug, trace};

use crate::compiler::{compile_rules, CompiledRule};
use crate::decision::{
    Action, Decision, DecisionSource, Enforcement, TlsVerdict, Verdict, HTTP_POLICY_RULE_NAME,
};
use crate::schema::{DefaultPolicy, EgressSettings, Mode, RawRule, Scheme};

// ---------------------------------------------------------------------------
// EgressEngine
// ---------------------------------------------------------------------------

/// The egress decision engine.
///
/// Holds the run's immutable settings and its compiled rules. Evaluation
/// takes `&self` and keeps no per-connection state, so one engine behind an
/// `Arc` serves every concurrent connection.
pub struct EgressEngine {
    settings: EgressSettings,
    /// Evaluated front to back; the first match wins.
    rules: Vec<CompiledRule>,
}

impl std::fmt::Debug for EgressEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EgressEngine")
            .field("mode", &self.settings.mode)
            .field("default_policy", &self.settings.default_policy)
            .field("allow_http", &self.settings.allow_http)
            .field("num_rules", &self.rules.len())
            .finish()
    }
}

impl EgressEngine {
    /// Compile `raw_rules` and build an engine. Invalid rules are dropped
    /// with a warning; construction itself cannot fail.
    pub fn new(settings: EgressSettings, raw_rules: &[RawRule]) -> Self {
        Self::from_compiled(settings, compile_rules(raw_rules))
    }

    pub fn from_compiled(settings: EgressSettings, rules: Vec<CompiledRule>) -> Self {
        Self { settings, rules }
    }

    pub fn settings(&self) -> &EgressSettings {
        &self.settings
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    // -- Evaluate entry points ------------------------------------------------

    /// Pre-connection evaluation from the TLS ClientHello server name.
    ///
    /// The first rule whose destination matches is selected. If that rule is
    /// path-scoped the decision is deferred to per-request evaluation.
    pub fn evaluate_tls(&self, domain: &str) -> TlsVerdict {
        let domain = domain.to_lowercase();
        debug!(%domain, "evaluating TLS connection against egress rules");

        let decision = match self.rules.iter().find(|r| r.matches_domain(&domain)) {
            Some(rule) if rule.is_path_scoped() => {
                trace!(rule = %rule.name, %domain, "path-scoped rule matched; deferring decision");
                return TlsVerdict::Deferred {
                    rule: rule.name.clone(),
                };
            }
            Some(rule) => self.decision_from_rule(rule, domain, Scheme::Https),
            None => self.default_decision(domain, Scheme::Https),
        };

        TlsVerdict::Decided(self.verdict(decision))
    }

    /// Per-request evaluation with the request path available.
    ///
    /// Plaintext HTTP is refused outright when disallowed. Otherwise rules
    /// are walked in order; a rule without paths decides on a domain match,
    /// a path-scoped rule decides only on its first matching path. Both
    /// loops stop at the first decision.
    pub fn evaluate_request(&self, domain: &str, scheme: Scheme, path: &str) -> Verdict {
        let domain = domain.to_lowercase();
        debug!(%domain, %scheme, path, "evaluating request against egress rules");

        if scheme == Scheme::Http && !self.settings.allow_http {
            return self.verdict(Decision {
                action: Action::Block,
                source: DecisionSource::HttpPolicy,
                rule_name: HTTP_POLICY_RULE_NAME.to_string(),
                destination: domain,
                scheme,
            });
        }

        let applied = self
            .rules
            .iter()
            .filter(|rule| rule.matches_domain(&domain))
            .find(|rule| !rule.is_path_scoped() || rule.paths().iter().any(|p| p.matches(path)));

        let decision = match applied {
            Some(rule) => {
                trace!(rule = %rule.name, "rule matched request");
                self.decision_from_rule(rule, domain, scheme)
            }
            None => self.default_decision(domain, scheme),
        };

        self.verdict(decision)
    }

    // -- Helpers --------------------------------------------------------------

    fn decision_from_rule(&self, rule: &CompiledRule, domain: String, scheme: Scheme) -> Decision {
        Decision {
            action: if rule.blocks() {
                Action::Block
            } else {
                Action::Allow
            },
            source: DecisionSource::Rule(rule.name.clone()),
            rule_name: rule.name.clone(),
            destination: domain,
            scheme,
        }
    }

    fn default_decision(&self, domain: String, scheme: Scheme) -> Decision {
        let policy = self.settings.default_policy;
        Decision {
            action: match policy {
                DefaultPolicy::AllowAll => Action::Allow,
                DefaultPolicy::BlockAll => Action::Block,
            },
            source: DecisionSource::DefaultPolicy,
            rule_name: policy.rule_name(),
            destination: domain,
            scheme,
        }
    }

    /// Audit mode never terminates; active mode terminates every block.
    fn verdict(&self, decision: Decision) -> Verdict {
        let enforcement = match (self.settings.mode, decision.action) {
            (Mode::Active, Action::Block) => Enforcement::Terminate,
            _ => Enforcement::Pass,
        };
        Verdict {
            decision,
            enforcement,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
