//! Keyword scan over host diagnostic logs.

use chrono::Utc;
use tracing::debug;

use super::Scanner;
use crate::client::Session;
use crate::error::Result;
use crate::model::{Issue, IssueSource, Severity};

pub const DEFAULT_LOG_LINES: usize = 500;
const MAX_MESSAGE_CHARS: usize = 200;

const ERROR_PATTERNS: [&str; 9] = [
    "error",
    "fail",
    "critical",
    "panic",
    "lost access",
    "cannot",
    "timeout",
    "refused",
    "corrupt",
];

const CRITICAL_PATTERNS: [&str; 3] = ["critical", "panic", "corrupt"];

/// Severity of a log line, or `None` when it matches no error pattern.
pub fn classify_line(line: &str) -> Option<Severity> {
    let lower = line.to_lowercase();
    if !ERROR_PATTERNS.iter().any(|p| lower.contains(p)) {
        return None;
    }
    if CRITICAL_PATTERNS.iter().any(|p| lower.contains(p)) {
        Some(Severity::Critical)
    } else {
        Some(Severity::Warning)
    }
}

fn excerpt(line: &str) -> String {
    line.trim().chars().take(MAX_MESSAGE_CHARS).collect()
}

#[derive(Debug, Clone)]
pub struct HostLogScanner {
    pub log_keys: Vec<String>,
    pub lines: usize,
    /// Restrict the scan to one host.
    pub host: Option<String>,
}

impl HostLogScanner {
    pub fn new(log_keys: Vec<String>) -> Self {
        Self {
            log_keys,
            lines: DEFAULT_LOG_LINES,
            host: None,
        }
    }

    pub fn for_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

#[async_trait::async_trait]
impl Scanner for HostLogScanner {
    fn name(&self) -> &'static str {
        "host_log"
    }

    async fn scan(&self, session: &dyn Session) -> Result<Vec<Issue>> {
        let hosts = session.list_hosts().await?;
        let mut issues = Vec::new();

        for host in hosts {
            if self.host.as_deref().is_some_and(|h| h != host.name) {
                continue;
            }
            if !host.has_diagnostics {
                continue;
            }
            for key in &self.log_keys {
                let lines = match session
                    .browse_diagnostic_log(&host.name, key, self.lines.max(1))
                    .await
                {
                    Ok(lines) => lines,
                    Err(e) => {
                        debug!(host = %host.name, key = %key, error = %e, "log stream unavailable");
                        continue;
                    }
                };
                for line in lines {
                    let Some(severity) = classify_line(&line) else {
                        continue;
                    };
                    issues.push(Issue {
                        severity,
                        source: IssueSource::HostLog(key.clone()),
                        message: format!("[{}] {}", host.name, excerpt(&line)),
                        time: Utc::now(),
                        entity: host.name.clone(),
                        event_type: None,
                    });
                }
            }
        }
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeSession;
    use crate::client::HostSummary;

    fn host(name: &str, diagnostics: bool) -> HostSummary {
        HostSummary {
            name: name.into(),
            connection_state: "connected".into(),
            power_state: "poweredOn".into(),
            vm_count: None,
            has_diagnostics: diagnostics,
        }
    }

    fn session() -> FakeSession {
        FakeSession::new().with(|s| {
            s.hosts = vec![host("esx-01", true), host("esx-02", true), host("esx-03", false)];
            s.logs.insert(
                ("esx-01".into(), "vmkernel".into()),
                vec![
                    "2026-03-01T12:00:00Z cpu0: NMI handled".into(),
                    "  2026-03-01T12:00:01Z Lost access to volume ds-1  ".into(),
                    "2026-03-01T12:00:02Z PANIC: corrupt heap".into(),
                ],
            );
            s.logs.insert(
                ("esx-02".into(), "hostd".into()),
                vec!["Connection REFUSED by peer".into()],
            );
        })
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("all good"), None);
        assert_eq!(classify_line("Operation TIMEOUT"), Some(Severity::Warning));
        assert_eq!(classify_line("Critical temperature"), Some(Severity::Critical));
        assert_eq!(classify_line("failed: corrupt metadata"), Some(Severity::Critical));
    }

    #[test]
    fn test_excerpt_truncates_and_trims() {
        let long = format!("   {}   ", "x".repeat(300));
        assert_eq!(excerpt(&long).chars().count(), 200);
        assert_eq!(excerpt("  a  "), "a");
    }

    #[tokio::test]
    async fn test_scan_matches_patterns_and_skips_missing_streams() {
        let scanner = HostLogScanner::new(vec!["vmkernel".into(), "hostd".into()]);
        let issues = scanner.scan(&session()).await.unwrap();

        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert_eq!(
            issues[0].message,
            "[esx-01] 2026-03-01T12:00:01Z Lost access to volume ds-1"
        );
        assert_eq!(issues[0].source.to_string(), "host_log:vmkernel");
        assert_eq!(issues[1].severity, Severity::Critical);
        assert_eq!(issues[2].entity, "esx-02");
        assert_eq!(issues[2].source, IssueSource::HostLog("hostd".into()));
    }

    #[tokio::test]
    async fn test_host_filter() {
        let scanner = HostLogScanner::new(vec!["hostd".into()]).for_host("esx-01");
        let issues = scanner.scan(&session()).await.unwrap();
        assert!(issues.is_empty());
    }
}
