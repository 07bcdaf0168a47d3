use std::path::{Path, PathBuf};
use std::sync::Arc;

use policy_engine::{Decision, Mode};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::entry::DecisionRecord;

/// Errors opening or appending to the decision log file.
#[derive(Debug, thiserror::Error)]
pub enum DecisionLogError {
    #[error("failed to open decision log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode decision record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to append to decision log: {0}")]
    Append(std::io::Error),
}

/// Shared, ordered, append-only log of egress decisions.
///
/// `EventLog` is a cheap `Clone` handle; every connection handler holds one.
/// Rule evaluation happens before the lock is taken, and the append plus
/// flush is a single critical section, so lines on disk are in decision
/// order.
///
/// An in-memory log keeps every record. A file-backed log keeps only a
/// count in memory: the file is the record of a run, and a long proxy run
/// must not grow without bound.
#[derive(Clone)]
pub struct EventLog {
    mode: Mode,
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    recorded: usize,
    retained: Vec<DecisionRecord>,
    file: Option<DecisionFile>,
}

/// JSON-lines file opened for append; parent directories are created.
struct DecisionFile {
    file: tokio::fs::File,
}

impl DecisionFile {
    async fn open(path: &Path) -> Result<Self, DecisionLogError> {
        let open_err = |source| DecisionLogError::Open {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(open_err)?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(open_err)?;

        Ok(Self { file })
    }

    /// One newline-terminated JSON object per record, flushed immediately.
    async fn append(&mut self, record: &DecisionRecord) -> Result<(), DecisionLogError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file.write_all(&line).await.map_err(DecisionLogError::Append)?;
        self.file.flush().await.map_err(DecisionLogError::Append)
    }
}

impl EventLog {
    /// A log that keeps every record in memory.
    pub fn in_memory(mode: Mode) -> Self {
        Self::with_file(mode, None)
    }

    /// A log that appends every record to the JSON-lines file at `path`.
    pub async fn open(path: impl AsRef<Path>, mode: Mode) -> Result<Self, DecisionLogError> {
        let file = DecisionFile::open(path.as_ref()).await?;
        Ok(Self::with_file(mode, Some(file)))
    }

    fn with_file(mode: Mode, file: Option<DecisionFile>) -> Self {
        Self {
            mode,
            inner: Arc::new(Mutex::new(Inner {
                recorded: 0,
                retained: Vec::new(),
                file,
            })),
        }
    }

    /// Append `decision` and return the stored record.
    ///
    /// Disk failures are logged and never reach the caller: decision
    /// logging does not affect the connection being decided.
    pub async fn record(&self, decision: &Decision) -> DecisionRecord {
        let record = DecisionRecord::new(decision, self.mode);

        let mut inner = self.inner.lock().await;
        inner.recorded += 1;
        match inner.file.as_mut() {
            Some(file) => {
                if let Err(err) = file.append(&record).await {
                    tracing::error!(
                        %err,
                        destination = %record.destination,
                        action = record.action.as_str(),
                        rule = %record.rule_name,
                        "failed to persist egress decision"
                    );
                }
            }
            None => inner.retained.push(record.clone()),
        }

        record
    }

    /// Records kept in memory, in append order. Empty for a file-backed
    /// log; read the file back with [`crate::read_json_lines`] instead.
    pub async fn snapshot(&self) -> Vec<DecisionRecord> {
        self.inner.lock().await.retained.clone()
    }

    /// Number of decisions recorded so far.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.recorded
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
