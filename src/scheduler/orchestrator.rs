//! One scan cycle across every configured target.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::ScannerConfig;
use crate::model::{Issue, Severity};
use crate::notify::IssueSink;
use crate::scanner::{AlarmScanner, EventScanner, HostLogScanner, Scanner};
use crate::session::SessionManager;

/// Summary of one cycle, returned to the caller and never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub issues: Vec<Issue>,
    pub targets_scanned: usize,
    pub targets_failed: Vec<String>,
    pub notified: bool,
}

impl ScanReport {
    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

pub struct ScanOrchestrator {
    sessions: Arc<SessionManager>,
    scanners: Vec<Arc<dyn Scanner>>,
    sink: Arc<IssueSink>,
}

impl ScanOrchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        scanners: Vec<Arc<dyn Scanner>>,
        sink: Arc<IssueSink>,
    ) -> Self {
        Self {
            sessions,
            scanners,
            sink,
        }
    }

    /// Alarm, event and host-log scanners configured from `config`.
    pub fn default_scanners(config: &ScannerConfig) -> Vec<Arc<dyn Scanner>> {
        vec![
            Arc::new(AlarmScanner),
            Arc::new(EventScanner::new(
                config.lookback_hours,
                config.severity_threshold,
            )),
            Arc::new(HostLogScanner::new(config.log_types.clone())),
        ]
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Scan every configured target.
    pub async fn run_cycle(&self) -> ScanReport {
        let targets = self.sessions.list_targets();
        self.run_for(&targets).await
    }

    /// Scan `targets` in order. A target that cannot be reached becomes a
    /// critical connection issue; a failing scanner is logged and skipped.
    pub async fn run_for(&self, targets: &[String]) -> ScanReport {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(cycle = %cycle_id, targets = targets.len(), "scan cycle started");

        let mut issues = Vec::new();
        let mut targets_failed = Vec::new();

        for target in targets {
            let session = match self.sessions.connect(Some(target)).await {
                Ok(session) => session,
                Err(e) => {
                    error!(cycle = %cycle_id, endpoint = %target, error = %e, "connect failed");
                    issues.push(Issue::connection_failure(target, &e));
                    targets_failed.push(target.clone());
                    continue;
                }
            };

            for scanner in &self.scanners {
                match scanner.scan(session.as_ref()).await {
                    Ok(found) => {
                        info!(
                            cycle = %cycle_id,
                            endpoint = %target,
                            scanner = scanner.name(),
                            issues = found.len(),
                            "scanner finished"
                        );
                        issues.extend(found);
                    }
                    Err(e) => warn!(
                        cycle = %cycle_id,
                        endpoint = %target,
                        scanner = scanner.name(),
                        error = %e,
                        "scanner failed"
                    ),
                }
            }
        }

        let notified = self.sink.publish(&issues).await;
        let report = ScanReport {
            cycle_id,
            started_at,
            finished_at: Utc::now(),
            targets_scanned: targets.len() - targets_failed.len(),
            targets_failed,
            issues,
            notified,
        };
        info!(
            cycle = %cycle_id,
            issues = report.issues.len(),
            critical = report.count(Severity::Critical),
            warning = report.count(Severity::Warning),
            failed_targets = report.targets_failed.len(),
            notified,
            "scan cycle finished"
        );
        report
    }
}
