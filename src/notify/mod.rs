//! Issue fan-out and the audit trail.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::NotifyConfig;
use crate::error::Result;
use crate::model::Issue;

pub mod audit;
pub mod jsonl;
pub mod scan_log;
pub mod webhook;

pub use audit::{AuditEntry, AuditLog};
pub use scan_log::ScanLog;
pub use webhook::WebhookNotifier;

/// Delivers significant issues to an external channel.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Returns true when the channel accepted the batch. Delivery failures
    /// are logged, never raised.
    async fn send(&self, issues: &[Issue]) -> bool;
}

/// Persists every issue and forwards critical and warning ones.
pub struct IssueSink {
    log: ScanLog,
    notifier: Option<Arc<dyn Notifier>>,
}

impl IssueSink {
    pub fn new(log: ScanLog, notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self { log, notifier }
    }

    /// Scan log at `notify.log_file`; a webhook only when a URL is set.
    pub async fn from_config(config: &NotifyConfig) -> Result<Self> {
        let log = ScanLog::open(&config.log_file).await?;
        let notifier: Option<Arc<dyn Notifier>> = if config.webhook_url.is_empty() {
            None
        } else {
            Some(Arc::new(WebhookNotifier::new(
                config.webhook_url.clone(),
                Duration::from_secs(config.webhook_timeout),
            )?))
        };
        Ok(Self::new(log, notifier))
    }

    /// Record `issues` and notify. Returns whether a notification went out.
    pub async fn publish(&self, issues: &[Issue]) -> bool {
        for issue in issues {
            if let Err(e) = self.log.record(issue).await {
                warn!(error = %e, path = %self.log.path().display(), "failed to write scan log");
            }
        }

        let Some(notifier) = &self.notifier else {
            return false;
        };
        let significant: Vec<Issue> = issues
            .iter()
            .filter(|i| i.severity.is_significant())
            .cloned()
            .collect();
        if significant.is_empty() {
            debug!("nothing to notify");
            return false;
        }
        notifier.send(&significant).await
    }
}
