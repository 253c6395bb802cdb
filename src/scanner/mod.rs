//! Issue scanners.
//!
//! Each scanner reads raw signals from one live session and returns
//! normalized [`Issue`]s. Scanners never change endpoint state.

use crate::client::Session;
use crate::error::Result;
use crate::model::Issue;

pub mod alarm;
pub mod event;
pub mod host_log;
pub mod taxonomy;

pub use alarm::{get_active_alarms, AlarmScanner};
pub use event::{get_recent_events, EventScanner};
pub use host_log::HostLogScanner;

/// Trait for all issue scanners.
#[async_trait::async_trait]
pub trait Scanner: Send + Sync {
    /// Short name used in logs ("alarm", "event", "host_log").
    fn name(&self) -> &'static str;

    async fn scan(&self, session: &dyn Session) -> Result<Vec<Issue>>;
}
