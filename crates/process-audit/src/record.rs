use serde::{Deserialize, Deserializer};

/// Process identifier as reported by the audit source.
pub type Pid = u32;

/// Tag carried by process-exec audit events.
pub const PROCESS_EXEC_TAG: &str = "warden_monitored_process_exec";
/// Tag carried by working-directory file-change events.
pub const FILE_CHANGE_TAG: &str = "warden_monitored_file_change";

const WATCH_TAG_PREFIX: &str = "warden_monitored_";
const WATCH_TAG_SUFFIX: &str = "_changes";

/// One line of the structured audit log.
///
/// Every field is optional; records missing what a given analysis needs are
/// simply ignored by that analysis.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AuditRecord {
    #[serde(default)]
    pub process: Option<ProcessInfo>,
    #[serde(default)]
    pub file: Option<FileInfo>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProcessInfo {
    #[serde(default, deserialize_with = "lenient_pid")]
    pub pid: Option<Pid>,
    #[serde(default, deserialize_with = "lenient_pid")]
    pub ppid: Option<Pid>,
    #[serde(default)]
    pub exe: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub path: Option<String>,
}

impl AuditRecord {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn is_process_exec(&self) -> bool {
        self.has_tag(PROCESS_EXEC_TAG)
    }

    pub fn is_file_change(&self) -> bool {
        self.has_tag(FILE_CHANGE_TAG)
    }

    /// True for events raised by a watch on a fixed sensitive path.
    pub fn is_watch_event(&self) -> bool {
        self.tags
            .iter()
            .any(|t| t.starts_with(WATCH_TAG_PREFIX) && t.ends_with(WATCH_TAG_SUFFIX))
    }

    /// `(ppid, pid)` of an exec record, when both are known.
    pub fn exec_edge(&self) -> Option<(Pid, Pid)> {
        if !self.is_process_exec() {
            return None;
        }
        let process = self.process.as_ref()?;
        Some((process.ppid?, process.pid?))
    }

    pub fn pid(&self) -> Option<Pid> {
        self.process.as_ref()?.pid
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file.as_ref()?.path.as_deref()
    }

    pub fn cwd(&self) -> Option<&str> {
        self.process.as_ref()?.cwd.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

/// Accept a pid as a JSON number or a numeric string; anything else is `None`.
fn lenient_pid<'de, D>(deserializer: D) -> Result<Option<Pid>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(u64),
        Text(String),
        Other(serde_json::Value),
    }

    Ok(match Option::<Repr>::deserialize(deserializer)? {
        Some(Repr::Number(n)) => Pid::try_from(n).ok(),
        Some(Repr::Text(s)) => s.trim().parse().ok(),
        Some(Repr::Other(_)) | None => None,
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pids_as_numbers_or_strings() {
        let line = r#"{"process":{"pid":"42","ppid":7,"exe":"/bin/sh","args":["sh","-c","true"],"cwd":"/w"},"tags":["warden_monitored_process_exec"]}"#;
        let record: AuditRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.exec_edge(), Some((7, 42)));
        assert_eq!(record.cwd(), Some("/w"));
    }

    #[test]
    fn unparseable_pid_is_none() {
        let line = r#"{"process":{"pid":"abc","ppid":-3},"tags":["warden_monitored_process_exec"]}"#;
        let record: AuditRecord = serde_json::from_str(line).unwrap();
        let process = record.process.as_ref().unwrap();
        assert_eq!(process.pid, None);
        assert_eq!(process.ppid, None);
        assert_eq!(record.exec_edge(), None);
    }

    #[test]
    fn exec_edge_requires_exec_tag() {
        let line = r#"{"process":{"pid":2,"ppid":1},"tags":["something_else"]}"#;
        let record: AuditRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.exec_edge(), None);
    }

    #[test]
    fn null_fields_are_tolerated() {
        let line = r#"{"process":{"pid":1,"args":null},"file":null,"tags":null}"#;
        let record: AuditRecord = serde_json::from_str(line).unwrap();
        assert!(record.tags.is_empty());
        assert!(record.process.unwrap().args.is_empty());
        assert!(record.file.is_none());
    }

    #[test]
    fn watch_tags() {
        let record = AuditRecord {
            tags: vec!["warden_monitored_sudoers_changes".into()],
            ..Default::default()
        };
        assert!(record.is_watch_event());
        assert!(!record.is_file_change());

        let exec = AuditRecord {
            tags: vec![PROCESS_EXEC_TAG.into()],
            ..Default::default()
        };
        assert!(!exec.is_watch_event());
    }
}
