//! Periodic scan scheduling.
//!
//! The scheduler runs one cycle at start and then one per interval. At most
//! one cycle is in flight: a tick that finds the previous cycle still running
//! is skipped, not queued. Cancellation stops the loop without waiting for the
//! running cycle, then removes the pid file and releases every session.

pub mod orchestrator;
pub mod pidfile;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use orchestrator::{ScanOrchestrator, ScanReport};
pub use pidfile::PidFile;

use crate::error::Result;
use crate::session::SessionManager;

/// Counters returned when the loop exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles_started: u64,
    pub ticks_skipped: u64,
    /// Whether a cycle was still running at cancellation and got aborted.
    pub aborted_in_flight: bool,
}

pub struct Scheduler {
    orchestrator: Arc<ScanOrchestrator>,
    sessions: Arc<SessionManager>,
    interval: Duration,
    pid_path: Option<PathBuf>,
    torn_down: AtomicBool,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<ScanOrchestrator>, interval: Duration) -> Self {
        let sessions = orchestrator.sessions().clone();
        Self {
            orchestrator,
            sessions,
            interval,
            pid_path: None,
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn with_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_path = Some(path.into());
        self
    }

    /// Run until `cancel` fires. Teardown always runs before returning.
    pub async fn run(&self, cancel: CancellationToken) -> Result<SchedulerStats> {
        let pid = match &self.pid_path {
            Some(path) => Some(PidFile::create(path)?),
            None => None,
        };

        info!(
            interval_secs = self.interval.as_secs(),
            pid = std::process::id(),
            "scanner daemon started"
        );

        // The first tick completes immediately, so the first cycle runs at start.
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut stats = SchedulerStats::default();
        let mut in_flight: Option<JoinHandle<ScanReport>> = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("shutdown requested, stopping scheduler");
                    break;
                }
                _ = ticker.tick() => {
                    if let Some(handle) = in_flight.as_ref() {
                        if !handle.is_finished() {
                            stats.ticks_skipped += 1;
                            warn!("previous scan cycle still running, skipping this tick");
                            continue;
                        }
                    }
                    if let Some(handle) = in_flight.take() {
                        if let Err(e) = handle.await {
                            error!(error = %e, "scan cycle panicked");
                        }
                    }
                    let orchestrator = self.orchestrator.clone();
                    in_flight = Some(tokio::spawn(async move { orchestrator.run_cycle().await }));
                    stats.cycles_started += 1;
                }
            }
        }

        if let Some(handle) = in_flight.take() {
            if !handle.is_finished() {
                handle.abort();
                stats.aborted_in_flight = true;
                info!("in-flight scan cycle aborted");
            }
        }

        self.teardown(pid.as_ref()).await;
        Ok(stats)
    }

    /// Remove the pid file and release sessions. Runs once.
    async fn teardown(&self, pid: Option<&PidFile>) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pid) = pid {
            pid.remove();
        }
        self.sessions.shutdown().await;
        info!("scanner daemon stopped");
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}

/// Cancel `token` when a shutdown signal arrives.
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    })
}
