use std::path::Path;

use serde::de::DeserializeOwned;

/// Read a JSON-lines file, keeping every line that parses as `T`.
///
/// The file is decoded lossily so a stray invalid byte only spoils the line
/// it sits on. See [`parse_json_lines`] for the per-line rules.
pub fn read_json_lines<T: DeserializeOwned>(path: impl AsRef<Path>) -> std::io::Result<Vec<T>> {
    let bytes = std::fs::read(path.as_ref())?;
    Ok(parse_json_lines(&String::from_utf8_lossy(&bytes)))
}

/// Parse JSON-lines text into records.
///
/// Blank lines are skipped silently. Lines that are not valid JSON for `T`,
/// including a truncated final line, are skipped with a warning.
pub fn parse_json_lines<T: DeserializeOwned>(text: &str) -> Vec<T> {
    let mut records = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(line) {
            Ok(record) => records.push(record),
            Err(err) => {
                tracing::warn!(line = idx + 1, %err, "skipping malformed JSON line");
            }
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        n: u32,
    }

    #[test]
    fn skips_blank_and_malformed_lines() {
        let text = "{\"n\":1}\n\n   \nnot json\n{\"n\":2}\n{\"n\":";
        let rows: Vec<Row> = parse_json_lines(text);
        assert_eq!(rows, vec![Row { n: 1 }, Row { n: 2 }]);
    }

    #[test]
    fn empty_input_yields_nothing() {
        let rows: Vec<Row> = parse_json_lines("");
        assert!(rows.is_empty());
    }

    #[test]
    fn reads_file_with_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let mut bytes = b"{\"n\":7}\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        bytes.extend_from_slice(b"{\"n\":8}\n");
        std::fs::write(&path, bytes).unwrap();

        let rows: Vec<Row> = read_json_lines(&path).unwrap();
        assert_eq!(rows, vec![Row { n: 7 }, Row { n: 8 }]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result: std::io::Result<Vec<Row>> = read_json_lines(dir.path().join("nope"));
        assert!(result.is_err());
    }
}
