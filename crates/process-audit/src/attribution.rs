use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::record::{AuditRecord, Pid, ProcessInfo};
use crate::tree::ProcessTree;

/// Label used for any actor launched from a shell script.
pub const SHELL_SCRIPT_ACTOR: &str = "Shell Script";
/// Label used when a boundary process left no usable arguments.
pub const UNKNOWN_ACTOR: &str = "unknown";

pub const DEFAULT_SUDO_EXE: &str = "/usr/bin/sudo";

/// Identities needed to root and label the process tree.
#[derive(Debug, Clone)]
pub struct AttributionContext {
    pub runner_pid: Pid,
    pub tool_pid: Pid,
    /// Actor name for activity under the tool's own process.
    pub tool_name: String,
    pub sudo_exe: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributedSudoCall {
    pub actor_name: String,
    pub command: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SudoAttribution {
    /// One entry per actor, first call wins.
    pub calls: Vec<AttributedSudoCall>,
    /// Sudo calls with no boundary process among their ancestors.
    pub unattributed: usize,
}

/// Resolves pids to the actor responsible for their process subtree.
pub struct Attributor<'a> {
    ctx: AttributionContext,
    tree: ProcessTree,
    processes: HashMap<Pid, &'a ProcessInfo>,
    records: &'a [AuditRecord],
}

impl<'a> Attributor<'a> {
    pub fn new(records: &'a [AuditRecord], ctx: AttributionContext) -> Self {
        let tree = ProcessTree::from_records(ctx.runner_pid, ctx.tool_pid, records);

        let mut processes = HashMap::new();
        for record in records.iter().filter(|r| r.is_process_exec()) {
            if let Some(process) = record.process.as_ref() {
                if let Some(pid) = process.pid {
                    processes.entry(pid).or_insert(process);
                }
            }
        }

        tracing::debug!(
            nodes = tree.len(),
            processes = processes.len(),
            "built process tree"
        );

        Self {
            ctx,
            tree,
            processes,
            records,
        }
    }

    pub fn tree(&self) -> &ProcessTree {
        &self.tree
    }

    /// Name of the actor whose boundary process encloses `pid`.
    pub fn actor_for(&self, pid: Pid) -> Option<String> {
        let boundary = self.tree.nearest_boundary_ancestor(pid)?;
        if boundary == self.ctx.tool_pid {
            return Some(self.ctx.tool_name.clone());
        }

        let args = self
            .processes
            .get(&boundary)
            .map(|p| p.args.as_slice())
            .unwrap_or_default();
        Some(actor_name_from_args(args))
    }

    /// Attribute every sudo exec in the run to its actor.
    pub fn sudo_calls(&self) -> SudoAttribution {
        let mut result = SudoAttribution::default();
        let mut seen_actors = HashSet::new();

        for record in self.records {
            let Some((_, pid)) = record.exec_edge() else {
                continue;
            };
            let Some(process) = record.process.as_ref() else {
                continue;
            };
            if process.exe.as_deref() != Some(self.ctx.sudo_exe.as_str()) {
                continue;
            }

            match self.actor_for(pid) {
                Some(actor_name) => {
                    if seen_actors.insert(actor_name.clone()) {
                        result.calls.push(AttributedSudoCall {
                            actor_name,
                            command: process.args.join(" "),
                        });
                    }
                }
                None => {
                    tracing::debug!(pid, "sudo call outside any action boundary");
                    result.unattributed += 1;
                }
            }
        }

        result
    }
}

/// Derive a readable actor name from a boundary process's arguments.
///
/// Actions run from `/home/<user>/work/_actions/<owner>/<repo>/...`, so the
/// two path segments after `_actions` in the last argument name the action.
/// Anything ending in `.sh` is a script step.
pub fn actor_name_from_args(args: &[String]) -> String {
    let Some(last) = args.last() else {
        return UNKNOWN_ACTOR.to_string();
    };

    let name = last
        .split('/')
        .skip(5)
        .take(2)
        .collect::<Vec<_>>()
        .join("/");
    let name = if name.is_empty() { last.clone() } else { name };

    if name.ends_with(".sh") {
        SHELL_SCRIPT_ACTOR.to_string()
    } else if name.is_empty() {
        UNKNOWN_ACTOR.to_string()
    } else {
        name
    }
}
