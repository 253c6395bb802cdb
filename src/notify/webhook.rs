//! Webhook notifier.
//!
//! Posts a JSON document that carries both the raw issues and a
//! Slack-compatible `text` field, so the same URL works for Slack, Discord
//! or any endpoint that accepts a JSON POST.

use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::Notifier;
use crate::model::{Issue, Severity};

const MAX_TEXT_LINES: usize = 20;

pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

pub fn format_text(issues: &[Issue]) -> String {
    let mut lines = vec!["*VMware AIops Scanner Alert*\n".to_string()];
    for issue in issues.iter().take(MAX_TEXT_LINES) {
        let icon = if issue.severity == Severity::Critical {
            ":red_circle:"
        } else {
            ":warning:"
        };
        lines.push(format!("{icon} `{}` {}", issue.entity, issue.message));
    }
    if issues.len() > MAX_TEXT_LINES {
        lines.push(format!("\n... and {} more", issues.len() - MAX_TEXT_LINES));
    }
    lines.join("\n")
}

pub fn build_payload(issues: &[Issue]) -> Value {
    let critical = issues
        .iter()
        .filter(|i| i.severity == Severity::Critical)
        .count();
    let warning = issues
        .iter()
        .filter(|i| i.severity == Severity::Warning)
        .count();
    json!({
        "source": "vmware-aiops",
        "timestamp": Utc::now().to_rfc3339(),
        "summary": format!("VMware AIops: {critical} critical, {warning} warning issue(s)"),
        "issues": issues,
        "text": format_text(issues),
    })
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, issues: &[Issue]) -> bool {
        if self.url.is_empty() {
            return false;
        }
        let payload = build_payload(issues);
        match self.client.post(&self.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(issues = issues.len(), "webhook sent");
                true
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                let excerpt: String = body.chars().take(200).collect();
                warn!(status = %status, body = %excerpt, "webhook rejected");
                false
            }
            Err(e) => {
                error!(error = %e, "webhook failed");
                false
            }
        }
    }
}
