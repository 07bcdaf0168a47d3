use std::path::{Path, PathBuf};

use crate::record::AuditRecord;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read audit log {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Load audit records from `path`.
///
/// Accepts either one JSON object per line or a single JSON array of
/// objects. Only an unreadable file is an error; malformed entries are
/// skipped with a warning.
pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>, LoadError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let records = parse_records(&String::from_utf8_lossy(&bytes));
    tracing::debug!(path = %path.display(), records = records.len(), "loaded audit records");
    Ok(records)
}

/// Parse audit log text; see [`load_records`].
pub fn parse_records(text: &str) -> Vec<AuditRecord> {
    match text.trim_start().strip_prefix('[') {
        Some(body) => parse_array(body),
        None => audit_log::parse_json_lines(text),
    }
}

/// Read array elements one at a time so a truncated array still yields
/// every element written before the cut.
fn parse_array(body: &str) -> Vec<AuditRecord> {
    let mut records = Vec::new();
    let mut rest = body;

    for index in 0.. {
        rest = rest.trim_start();
        if rest.starts_with(']') {
            break;
        }
        if rest.is_empty() {
            tracing::warn!(records = records.len(), "audit log array is not terminated; keeping records read so far");
            break;
        }

        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<serde_json::Value>();
        let item = match stream.next() {
            Some(Ok(item)) => item,
            Some(Err(err)) => {
                tracing::warn!(index, %err, records = records.len(), "audit log array is truncated or malformed; keeping records read so far");
                break;
            }
            None => break,
        };
        rest = &rest[stream.byte_offset()..];

        match serde_json::from_value(item) {
            Ok(record) => records.push(record),
            Err(err) => tracing::warn!(index, %err, "skipping malformed audit record"),
        }

        rest = rest.trim_start();
        rest = rest.strip_prefix(',').unwrap_or(rest);
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_lines_do_not_stop_the_load() {
        let text = r#"{"process":{"pid":1,"ppid":0},"tags":["warden_monitored_process_exec"]}
{"process":{"pid":
this is not json

{"process":{"pid":2,"ppid":1},"tags":["warden_monitored_process_exec"]}
"#;
        let records = parse_records(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].exec_edge(), Some((1, 2)));
    }

    #[test]
    fn json_array_input() {
        let text = r#"[
            {"process":{"pid":5,"ppid":4},"tags":["warden_monitored_process_exec"]},
            {"process":"nonsense"},
            {"file":{"path":"/etc/passwd"},"tags":["warden_monitored_passwd_changes"]}
        ]"#;
        let records = parse_records(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].file_path(), Some("/etc/passwd"));
    }

    #[test]
    fn truncated_json_array_keeps_complete_elements() {
        let text = concat!(
            "[\n",
            r#"{"process":{"pid":2,"ppid":1},"tags":["warden_monitored_process_exec"]},"#, "\n",
            r#"{"process":{"pid":3,"ppid":2},"tags":["warden_monitored_process_exec"]},"#, "\n",
            r#"{"process":{"pi"#,
        );
        let records = parse_records(text);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].exec_edge(), Some((1, 2)));
        assert_eq!(records[1].exec_edge(), Some((2, 3)));
    }

    #[test]
    fn unterminated_json_array_after_last_element() {
        let text = "[ {\"process\":{\"pid\":7,\"ppid\":6}},\n";
        assert_eq!(parse_records(text).len(), 1);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.json");
        std::fs::write(
            &path,
            "{\"process\":{\"pid\":3,\"ppid\":2},\"tags\":[\"warden_monitored_process_exec\"]}\n{\"proc",
        )
        .unwrap();
        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_records(dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }
}
