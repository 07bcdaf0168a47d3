//! # policy-engine
//!
//! Egress decision logic for the egress-warden proxy. This crate loads YAML
//! rule lists, compiles wildcard destinations and paths into anchored
//! matchers, and decides allow/block for each connection attempt.
//!
//! ## Quick start
//!
//! ```rust
//! use policy_engine::{loader, EgressEngine, EgressSettings, Mode, Scheme};
//!
//! let rules = loader::parse_rules(r#"
//! - name: "github"
//!   destination: "*.github.com"
//!   action: "allow"
//! "#);
//! let settings = EgressSettings { mode: Mode::Active, ..Default::default() };
//! let engine = EgressEngine::new(settings, &rules);
//!
//! let verdict = engine.evaluate_request("api.github.com", Scheme::Https, "/zen");
//! assert!(!verdict.terminates());
//! ```

mod compiler;
mod decision;
mod evaluator;
pub mod loader;
pub mod matcher;
pub mod platform;
mod schema;

// Re-export primary public API at crate root.
pub use compiler::{compile_rules, CompiledPath, CompiledRule};
pub use decision::{
    Action, Decision, DecisionSource, Enforcement, TlsVerdict, Verdict, HTTP_POLICY_RULE_NAME,
};
pub use evaluator::EgressEngine;
pub use schema::{
    parse_flag, DefaultPolicy, EgressSettings, Mode, RawRule, RuleAction, Scheme,
};
