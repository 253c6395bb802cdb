//! Shared services built once by the entry point and passed down.

use std::sync::Arc;
use std::time::Duration;

use crate::client::{Connector, RestConnector};
use crate::config::AppConfig;
use crate::confirm::{ConfirmationGate, Prompter};
use crate::error::Result;
use crate::notify::{AuditLog, IssueSink};
use crate::ops::LifecycleRunner;
use crate::scheduler::{ScanOrchestrator, Scheduler};
use crate::session::SessionManager;
use crate::task::TaskWaiter;

pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub sessions: Arc<SessionManager>,
    pub audit: Arc<AuditLog>,
    pub waiter: TaskWaiter,
}

impl AppContext {
    pub async fn new(config: AppConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let config = Arc::new(config);
        let audit = Arc::new(AuditLog::open(&config.audit.log_file).await?);
        Ok(Self {
            sessions: Arc::new(SessionManager::new(config.clone(), connector)),
            config,
            audit,
            waiter: TaskWaiter::default(),
        })
    }

    /// Context backed by the vSphere REST binding.
    pub async fn with_rest(config: AppConfig) -> Result<Self> {
        Self::new(config, Arc::new(RestConnector::default())).await
    }

    /// Log out every session opened through this context. One-shot commands
    /// call this whether they succeeded or not.
    pub async fn close(&self) {
        self.sessions.shutdown().await;
    }

    pub fn lifecycle(&self, prompter: Arc<dyn Prompter>) -> LifecycleRunner {
        LifecycleRunner::new(
            self.sessions.clone(),
            self.waiter.clone(),
            ConfirmationGate::new(prompter, self.audit.clone()),
            self.audit.clone(),
        )
    }

    pub async fn orchestrator(&self) -> Result<ScanOrchestrator> {
        let sink = IssueSink::from_config(&self.config.notify).await?;
        Ok(ScanOrchestrator::new(
            self.sessions.clone(),
            ScanOrchestrator::default_scanners(&self.config.scanner),
            Arc::new(sink),
        ))
    }

    pub async fn scheduler(&self) -> Result<Scheduler> {
        let minutes = self.config.scanner.interval_minutes.max(1);
        Ok(Scheduler::new(
            Arc::new(self.orchestrator().await?),
            Duration::from_secs(minutes * 60),
        ))
    }
}
