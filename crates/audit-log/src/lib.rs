//! Append-only JSON-lines decision logging for egress-warden.
//!
//! Every egress decision becomes one [`DecisionRecord`], appended to a shared
//! in-memory [`EventLog`] and, optionally, to a
//! [JSON Lines](https://jsonlines.org/) file. After a run, the file can be
//! read back with [`read_json_lines`] and summarised into known and unknown
//! destinations with [`DestinationReport`].
//!
//! # Quick start
//!
//! ```rust,no_run
//! use audit_log::{read_json_lines, DecisionRecord, DestinationReport, EventLog};
//! use policy_engine::{EgressEngine, EgressSettings, Mode, Scheme};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let log = EventLog::open("/var/log/egress-warden/decisions.jsonl", Mode::Audit).await?;
//! let engine = EgressEngine::new(EgressSettings::default(), &[]);
//!
//! let verdict = engine.evaluate_request("example.com", Scheme::Https, "/");
//! log.record(&verdict.decision).await;
//!
//! let records: Vec<DecisionRecord> =
//!     read_json_lines("/var/log/egress-warden/decisions.jsonl")?;
//! let report = DestinationReport::from_records(&records);
//! println!("{} unknown destinations", report.unknown.len());
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod reader;
pub mod report;
pub mod sink;

// Re-export primary public types at the crate root for convenience.
pub use entry::DecisionRecord;
pub use reader::{parse_json_lines, read_json_lines};
pub use report::{dedupe, Classification, DestinationReport};
pub use sink::{DecisionLogError, EventLog};
