//! Append-only JSON-lines file shared by the scan log and the audit trail.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

/// One record per line, written with a single `write_all` under a lock so
/// concurrent writers never interleave.
pub struct JsonlWriter {
    path: PathBuf,
    writer: Mutex<tokio::fs::File>,
}

impl JsonlWriter {
    /// Open (or create) `path` in append mode, creating parent directories.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        debug!(path = %path.display(), "jsonl log opened");
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    pub async fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
