//! vmware-aiops -- issue scanning and audited lifecycle operations for
//! vCenter/ESXi fleets.
//!
//! This crate provides the session manager, the alarm/event/host-log
//! scanners, the scan scheduler, notification sinks, the audit trail and the
//! confirmation-gated VM lifecycle operations.

pub mod client;
pub mod clock;
pub mod config;
pub mod confirm;
pub mod context;
pub mod error;
pub mod model;
pub mod notify;
pub mod ops;
pub mod scanner;
pub mod scheduler;
pub mod session;
pub mod task;

use std::path::Path;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

pub use context::AppContext;
pub use error::Error;

/// Start the scanner daemon and block until a shutdown signal arrives.
pub async fn run_daemon(config_path: Option<&Path>) -> Result<()> {
    let config = config::AppConfig::load_from(config_path).context("failed to load config")?;
    if !config.scanner.enabled {
        tracing::info!("scanner is disabled in config, not starting");
        return Ok(());
    }

    let ctx = AppContext::with_rest(config).await?;
    let scheduler = ctx
        .scheduler()
        .await?
        .with_pid_file(config::state_dir().join("daemon.pid"));

    let cancel = CancellationToken::new();
    let _signals = scheduler::cancel_on_signal(cancel.clone());

    let stats = scheduler.run(cancel).await?;
    tracing::info!(
        cycles = stats.cycles_started,
        skipped = stats.ticks_skipped,
        "daemon exited"
    );
    Ok(())
}
