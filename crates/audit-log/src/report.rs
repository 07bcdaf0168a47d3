//! Post-run aggregation of decision records into known and unknown
//! destinations.

use std::collections::HashSet;

use policy_engine::{Action, Scheme};
use serde::Serialize;

use crate::entry::DecisionRecord;

/// Whether a destination was anticipated by the operator's rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Covered by an explicit rule, or allowed anyway.
    ///
    /// A block made by an explicit rule is known: the operator named the
    /// destination, so it is not a surprise worth a separate section.
    Known,
    /// Blocked only because no rule covered it (default or HTTP policy).
    Unknown,
    /// TLS connection tunnelled under a path-scoped rule without a
    /// connection-level decision. Every path on the host was reachable.
    Deferred,
}

impl Classification {
    pub fn of(record: &DecisionRecord) -> Self {
        if record.deferred {
            Classification::Deferred
        } else if record.default && record.action == Action::Block {
            Classification::Unknown
        } else {
            Classification::Known
        }
    }
}

/// Keep the first record for each `(destination, scheme)` pair, in
/// first-seen order.
pub fn dedupe(records: &[DecisionRecord]) -> Vec<DecisionRecord> {
    let mut seen: HashSet<(&str, Scheme)> = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert((r.destination.as_str(), r.scheme)))
        .cloned()
        .collect()
}

/// Deduplicated destinations partitioned by [`Classification`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct DestinationReport {
    pub known: Vec<DecisionRecord>,
    pub unknown: Vec<DecisionRecord>,
    pub deferred: Vec<DecisionRecord>,
}

impl DestinationReport {
    pub fn from_records(records: &[DecisionRecord]) -> Self {
        let mut report = Self::default();
        for record in dedupe(records) {
            match Classification::of(&record) {
                Classification::Known => report.known.push(record),
                Classification::Unknown => report.unknown.push(record),
                Classification::Deferred => report.deferred.push(record),
            }
        }
        tracing::debug!(
            known = report.known.len(),
            unknown = report.unknown.len(),
            deferred = report.deferred.len(),
            "aggregated decision records"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use policy_engine::Mode;

    fn record(destination: &str, scheme: Scheme, action: Action, default: bool, rule: &str) -> DecisionRecord {
        DecisionRecord {
            action,
            destination: destination.into(),
            scheme,
            rule_name: rule.into(),
            default,
            deferred: false,
            mode: Mode::Audit,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn dedupe_keeps_first_per_destination_and_scheme() {
        let records = vec![
            record("a.com", Scheme::Https, Action::Allow, false, "first"),
            record("a.com", Scheme::Https, Action::Block, true, "second"),
            record("a.com", Scheme::Http, Action::Block, true, "http"),
            record("b.com", Scheme::Https, Action::Allow, false, "b"),
        ];
        let unique = dedupe(&records);
        let names: Vec<_> = unique.iter().map(|r| r.rule_name.as_str()).collect();
        assert_eq!(names, ["first", "http", "b"]);
    }

    #[test]
    fn classification() {
        assert_eq!(
            Classification::of(&record("a", Scheme::Https, Action::Block, true, "Default Policy - block-all")),
            Classification::Unknown
        );
        assert_eq!(
            Classification::of(&record("a", Scheme::Http, Action::Block, true, "allow_http is False")),
            Classification::Unknown
        );
        assert_eq!(
            Classification::of(&record("a", Scheme::Https, Action::Block, false, "deny-list")),
            Classification::Known
        );
        assert_eq!(
            Classification::of(&record("a", Scheme::Https, Action::Allow, true, "Default Policy - allow-all")),
            Classification::Known
        );
    }

    #[test]
    fn report_partitions_unique_records() {
        let records = vec![
            record("github.com", Scheme::Https, Action::Allow, false, "gh"),
            record("evil.com", Scheme::Https, Action::Block, true, "Default Policy - block-all"),
            record("evil.com", Scheme::Https, Action::Block, true, "Default Policy - block-all"),
        ];
        let report = DestinationReport::from_records(&records);
        assert_eq!(report.known.len(), 1);
        assert_eq!(report.unknown.len(), 1);
        assert_eq!(report.unknown[0].destination, "evil.com");
    }

    #[test]
    fn deferred_tunnels_get_their_own_section() {
        let mut tunnelled = record("api.example.com", Scheme::Https, Action::Allow, false, "meta only");
        tunnelled.deferred = true;
        assert_eq!(Classification::of(&tunnelled), Classification::Deferred);

        let records = vec![
            tunnelled,
            record("api.example.com", Scheme::Http, Action::Allow, false, "meta only"),
        ];
        let report = DestinationReport::from_records(&records);
        assert_eq!(report.deferred.len(), 1);
        assert_eq!(report.deferred[0].rule_name, "meta only");
        assert_eq!(report.known.len(), 1);
        assert!(report.unknown.is_empty());
    }

    #[test]
    fn empty_report() {
        let report = DestinationReport::from_records(&[]);
        assert!(report.known.is_empty() && report.unknown.is_empty() && report.deferred.is_empty());
    }
}
