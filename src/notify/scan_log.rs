//! Structured scan log.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::jsonl::JsonlWriter;
use crate::error::Result;
use crate::model::{Issue, Severity};

#[derive(Serialize)]
struct ScanLogEntry<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    issue: &'a Issue,
}

/// Writes each issue as one JSON line and mirrors it to the tracing
/// subscriber at a matching level.
pub struct ScanLog {
    file: JsonlWriter,
}

impl ScanLog {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            file: JsonlWriter::open(path).await?,
        })
    }

    pub async fn record(&self, issue: &Issue) -> Result<()> {
        self.file
            .append(&ScanLogEntry {
                timestamp: Utc::now(),
                issue,
            })
            .await?;

        let label = issue.severity.as_str().to_uppercase();
        match issue.severity {
            Severity::Critical => {
                error!(source = %issue.source, entity = %issue.entity, "[{label}] {}", issue.message)
            }
            Severity::Warning => {
                warn!(source = %issue.source, entity = %issue.entity, "[{label}] {}", issue.message)
            }
            Severity::Info => {
                info!(source = %issue.source, entity = %issue.entity, "[{label}] {}", issue.message)
            }
        }
        Ok(())
    }

    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }
}
