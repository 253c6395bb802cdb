//! Audit trail for state-changing operations.
//!
//! Every lifecycle command, including rejected ones, is appended as a single
//! JSON line recording what was done, where, the state before and after, and
//! who initiated it.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::jsonl::JsonlWriter;
use crate::error::Result;

pub const DEFAULT_SKILL: &str = "aiops";
pub const QUERY_SKILL: &str = "monitor";

pub const RESULT_OK: &str = "ok";
pub const RESULT_NOOP: &str = "no-op";
pub const RESULT_ADVISORY: &str = "advisory";
pub const RESULT_REJECTED: &str = "rejected";

/// Result string recorded for a failed operation.
pub fn result_error(message: impl std::fmt::Display) -> String {
    format!("error: {message}")
}

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// RFC 3339 timestamp of emission.
    pub timestamp: String,
    pub target: String,
    pub operation: String,
    pub resource: String,
    pub skill: String,
    pub parameters: Value,
    pub before_state: Value,
    pub after_state: Value,
    pub result: String,
    pub user: String,
}

impl AuditEntry {
    /// New entry stamped now, with empty state maps and the current OS user.
    pub fn new(
        target: impl Into<String>,
        operation: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            target: target.into(),
            operation: operation.into(),
            resource: resource.into(),
            skill: DEFAULT_SKILL.to_string(),
            parameters: json!({}),
            before_state: json!({}),
            after_state: json!({}),
            result: String::new(),
            user: current_user(),
        }
    }

    pub fn with_skill(mut self, skill: impl Into<String>) -> Self {
        self.skill = skill.into();
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_before(mut self, state: Value) -> Self {
        self.before_state = state;
        self
    }

    pub fn with_after(mut self, state: Value) -> Self {
        self.after_state = state;
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = result.into();
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }
}

/// OS user name from `USER`, then `USERNAME`, else `unknown`.
pub fn current_user() -> String {
    ["USER", "USERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

pub struct AuditLog {
    file: JsonlWriter,
}

impl AuditLog {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            file: JsonlWriter::open(path).await?,
        })
    }

    pub async fn log(&self, entry: AuditEntry) -> Result<()> {
        self.file.append(&entry).await?;
        info!(
            operation = %entry.operation,
            resource = %entry.resource,
            target_name = %entry.target,
            skill = %entry.skill,
            result = %entry.result,
            "[AUDIT] {} {} on {} ({}) -> {}",
            entry.operation,
            entry.resource,
            entry.target,
            entry.skill,
            entry.result
        );
        Ok(())
    }

    /// Record a read-only query.
    pub async fn log_query(&self, target: &str, resource: &str, query_type: &str) -> Result<()> {
        self.log(
            AuditEntry::new(target, "query", resource)
                .with_skill(QUERY_SKILL)
                .with_parameters(json!({ "query_type": query_type }))
                .with_result(RESULT_OK),
        )
        .await
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Read every entry back, oldest first.
    pub async fn read_all(&self) -> Result<Vec<AuditEntry>> {
        let content = tokio::fs::read_to_string(self.path()).await?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(Into::into))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
