use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;

use crate::attribution::Attributor;
use crate::record::{AuditRecord, Pid};

/// Credential stores and audit configuration watched during a run.
pub const SENSITIVE_GLOBS: &[&str] = &[
    "/etc/passwd",
    "/etc/shadow",
    "/etc/group",
    "/etc/sudoers",
    "/etc/sudoers.d/**",
    "/etc/docker/daemon.json",
    "/var/log/audit/audit.log",
    "/etc/audit/**",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TamperReason {
    /// A write, rename or delete hit a sensitive path.
    SensitivePath,
    /// More than one process changed the same file.
    ConcurrentWriters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TamperedPath {
    pub path: String,
    pub reason: TamperReason,
    /// Actor of the first change, when one could be resolved.
    pub actor: Option<String>,
    pub pids: Vec<Pid>,
}

/// Matcher for the sensitive path set plus the tool's home directory.
#[derive(Debug, Clone)]
pub struct SensitivePaths {
    globs: GlobSet,
    tool_home: Option<PathBuf>,
}

impl SensitivePaths {
    pub fn new(tool_home: Option<PathBuf>) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in SENSITIVE_GLOBS {
            builder.add(Glob::new(pattern)?);
        }
        Ok(Self {
            globs: builder.build()?,
            tool_home,
        })
    }

    pub fn is_match(&self, path: &Path) -> bool {
        if self.globs.is_match(path) {
            return true;
        }
        self.tool_home
            .as_deref()
            .is_some_and(|home| path.starts_with(home))
    }
}

/// Make `path` absolute against `cwd` and fold `.` and `..` lexically.
///
/// A relative path with no working directory stays relative.
pub fn resolve_path(cwd: Option<&str>, path: &str) -> PathBuf {
    let raw = Path::new(path);
    let joined = match cwd {
        Some(cwd) if raw.is_relative() => Path::new(cwd).join(raw),
        _ => raw.to_path_buf(),
    };

    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

/// Changes to sensitive paths, whoever made them.
///
/// Considers watch events and working-directory file changes. One entry per
/// path, in first-seen order.
pub fn sensitive_path_changes(
    records: &[AuditRecord],
    sensitive: &SensitivePaths,
    attributor: &Attributor<'_>,
) -> Vec<TamperedPath> {
    let mut found: Vec<TamperedPath> = Vec::new();
    let mut index: HashMap<PathBuf, usize> = HashMap::new();

    for record in records {
        if !(record.is_watch_event() || record.is_file_change()) {
            continue;
        }
        let Some(path) = record.file_path() else {
            continue;
        };
        let resolved = resolve_path(record.cwd(), path);
        if !sensitive.is_match(&resolved) {
            continue;
        }

        let pid = record.pid();
        match index.get(&resolved) {
            Some(&idx) => {
                if let Some(pid) = pid {
                    insert_sorted(&mut found[idx].pids, pid);
                }
            }
            None => {
                tracing::warn!(path = %resolved.display(), ?pid, "sensitive path modified during run");
                index.insert(resolved.clone(), found.len());
                found.push(TamperedPath {
                    path: resolved.display().to_string(),
                    reason: TamperReason::SensitivePath,
                    actor: pid.and_then(|pid| attributor.actor_for(pid)),
                    pids: pid.into_iter().collect(),
                });
            }
        }
    }

    found
}

/// Working-directory files changed by more than one distinct pid.
pub fn concurrent_writer_paths(
    records: &[AuditRecord],
    attributor: &Attributor<'_>,
) -> Vec<TamperedPath> {
    let mut order: Vec<PathBuf> = Vec::new();
    let mut writers: HashMap<PathBuf, (Pid, BTreeSet<Pid>)> = HashMap::new();

    for record in records.iter().filter(|r| r.is_file_change()) {
        let (Some(path), Some(pid)) = (record.file_path(), record.pid()) else {
            continue;
        };
        let resolved = resolve_path(record.cwd(), path);
        writers
            .entry(resolved.clone())
            .or_insert_with(|| {
                order.push(resolved);
                (pid, BTreeSet::new())
            })
            .1
            .insert(pid);
    }

    order
        .into_iter()
        .filter_map(|path| {
            let (first_pid, pids) = writers.remove(&path)?;
            if pids.len() < 2 {
                return None;
            }
            tracing::warn!(path = %path.display(), writers = pids.len(), "file changed by multiple processes");
            Some(TamperedPath {
                path: path.display().to_string(),
                reason: TamperReason::ConcurrentWriters,
                actor: attributor.actor_for(first_pid),
                pids: pids.into_iter().collect(),
            })
        })
        .collect()
}

fn insert_sorted(pids: &mut Vec<Pid>, pid: Pid) {
    if let Err(pos) = pids.binary_search(&pid) {
        pids.insert(pos, pid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribution::{AttributionContext, DEFAULT_SUDO_EXE};
    use crate::loader::parse_records;

    fn ctx() -> AttributionContext {
        AttributionContext {
            runner_pid: 1,
            tool_pid: 2,
            tool_name: "egress-warden".into(),
            sudo_exe: DEFAULT_SUDO_EXE.into(),
        }
    }

    #[test]
    fn resolves_relative_paths() {
        assert_eq!(
            resolve_path(Some("/work/repo"), "src/../Cargo.toml"),
            PathBuf::from("/work/repo/Cargo.toml")
        );
        assert_eq!(resolve_path(Some("/work"), "/etc/./passwd"), PathBuf::from("/etc/passwd"));
        assert_eq!(resolve_path(None, "a/b"), PathBuf::from("a/b"));
    }

    #[test]
    fn sensitive_matcher() {
        let sensitive = SensitivePaths::new(Some(PathBuf::from("/home/runner/.warden"))).unwrap();
        assert!(sensitive.is_match(Path::new("/etc/shadow")));
        assert!(sensitive.is_match(Path::new("/etc/sudoers.d/90-runner")));
        assert!(sensitive.is_match(Path::new("/etc/audit/rules.d/x.rules")));
        assert!(sensitive.is_match(Path::new("/home/runner/.warden/decisions.jsonl")));
        assert!(!sensitive.is_match(Path::new("/home/runner/.wardenx")));
        assert!(!sensitive.is_match(Path::new("/etc/hosts")));
    }

    #[test]
    fn flags_sensitive_changes_with_actor() {
        let records = parse_records(
            r#"
{"process":{"pid":10,"ppid":1,"exe":"/usr/bin/node","args":["node","/home/runner/work/_actions/evil/action/v1/index.js"]},"tags":["warden_monitored_process_exec"]}
{"process":{"pid":11,"ppid":10,"exe":"/usr/bin/tee"},"tags":["warden_monitored_process_exec"]}
{"process":{"pid":11,"cwd":"/"},"file":{"path":"etc/sudoers.d/evil"},"tags":["warden_monitored_sudoers_changes"]}
{"process":{"pid":12},"file":{"path":"/etc/sudoers.d/evil"},"tags":["warden_monitored_sudoers_changes"]}
{"process":{"pid":11},"file":{"path":"/etc/hosts"},"tags":["warden_monitored_hosts_changes"]}
{"process":{"pid":11},"file":{"path":"/etc/passwd"},"tags":["unrelated"]}
"#,
        );
        let attributor = Attributor::new(&records, ctx());
        let sensitive = SensitivePaths::new(None).unwrap();

        let flagged = sensitive_path_changes(&records, &sensitive, &attributor);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].path, "/etc/sudoers.d/evil");
        assert_eq!(flagged[0].actor.as_deref(), Some("evil/action"));
        assert_eq!(flagged[0].pids, vec![11, 12]);
    }

    #[test]
    fn flags_paths_written_by_several_pids() {
        let records = parse_records(
            r#"
{"process":{"pid":20,"cwd":"/work/repo"},"file":{"path":"build/out.bin"},"tags":["warden_monitored_file_change"]}
{"process":{"pid":21,"cwd":"/work/repo/build"},"file":{"path":"out.bin"},"tags":["warden_monitored_file_change"]}
{"process":{"pid":20,"cwd":"/work/repo"},"file":{"path":"notes.txt"},"tags":["warden_monitored_file_change"]}
{"process":{"pid":20,"cwd":"/work/repo"},"file":{"path":"notes.txt"},"tags":["warden_monitored_file_change"]}
{"process":{"pid":22,"cwd":"/work/repo"},"file":{"path":"other.txt"},"tags":["warden_monitored_process_exec"]}
"#,
        );
        let attributor = Attributor::new(&records, ctx());

        let flagged = concurrent_writer_paths(&records, &attributor);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].path, "/work/repo/build/out.bin");
        assert_eq!(flagged[0].reason, TamperReason::ConcurrentWriters);
        assert_eq!(flagged[0].pids, vec![20, 21]);
        assert_eq!(flagged[0].actor, None);
    }
}
