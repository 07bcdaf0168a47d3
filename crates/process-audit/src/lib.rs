//! # process-audit
//!
//! Offline analysis of the kernel audit log captured during a CI job.
//! Process-exec records are folded into a process tree rooted at the CI
//! runner; every sudo call and every tampering event is then attributed to
//! the outermost *boundary process* (a direct child of the runner) above it.
//!
//! ## Quick start
//!
//! ```rust
//! use process_audit::{analyze, loader, AttributionContext, SensitivePaths};
//!
//! let records = loader::parse_records(r#"
//! {"process":{"pid":11,"ppid":10,"exe":"/usr/bin/sudo","args":["sudo","true"]},"tags":["warden_monitored_process_exec"]}
//! "#);
//! let ctx = AttributionContext {
//!     runner_pid: 1,
//!     tool_pid: 10,
//!     tool_name: "egress-warden".into(),
//!     sudo_exe: "/usr/bin/sudo".into(),
//! };
//! let summary = analyze(&records, ctx, &SensitivePaths::new(None).unwrap());
//! assert_eq!(summary.sudo_calls[0].actor_name, "egress-warden");
//! ```

pub mod attribution;
pub mod loader;
pub mod record;
pub mod tampering;
pub mod tree;

use serde::Serialize;

pub use attribution::{
    actor_name_from_args, AttributedSudoCall, AttributionContext, Attributor, SudoAttribution,
};
pub use loader::{load_records, parse_records, LoadError};
pub use record::{AuditRecord, FileInfo, Pid, ProcessInfo};
pub use tampering::{SensitivePaths, TamperReason, TamperedPath};
pub use tree::{ProcessNode, ProcessTree};

/// Everything the attribution pass reports for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditSummary {
    pub sudo_calls: Vec<AttributedSudoCall>,
    pub unattributed_sudo_calls: usize,
    pub tampered_paths: Vec<TamperedPath>,
}

/// Run sudo attribution and both tampering detectors over `records`.
pub fn analyze(
    records: &[AuditRecord],
    ctx: AttributionContext,
    sensitive: &SensitivePaths,
) -> AuditSummary {
    let attributor = Attributor::new(records, ctx);
    let sudo = attributor.sudo_calls();

    let mut tampered_paths = tampering::sensitive_path_changes(records, sensitive, &attributor);
    tampered_paths.extend(tampering::concurrent_writer_paths(records, &attributor));

    AuditSummary {
        sudo_calls: sudo.calls,
        unattributed_sudo_calls: sudo.unattributed,
        tampered_paths,
    }
}
