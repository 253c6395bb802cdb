//! Waiting on long-running remote operations.
//!
//! [`advance`] is the pure transition: given the latest observed task state
//! and the time spent so far it decides whether the wait is finished, failed,
//! timed out or should sleep again. [`TaskWaiter::wait`] drives it against a
//! session and a [`Clock`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::client::{Session, TaskInfo, TaskRef, TaskState};
use crate::clock::{Clock, TokioClock};
use crate::error::{Error, Result};

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
/// Clone and migrate routinely run for several minutes.
pub const LONG_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Finished(Option<Value>),
    Failed(String),
    Sleep(Duration),
    TimedOut,
}

/// Decide the next step after observing `info` at `elapsed` into the wait.
pub fn advance(info: &TaskInfo, elapsed: Duration, timeout: Duration, interval: Duration) -> Step {
    match info.state {
        TaskState::Success => Step::Finished(info.result.clone()),
        TaskState::Error => Step::Failed(
            info.error
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string()),
        ),
        TaskState::Queued | TaskState::Running => {
            if elapsed >= timeout {
                Step::TimedOut
            } else {
                // Never sleep past the deadline.
                Step::Sleep(interval.min(timeout - elapsed))
            }
        }
    }
}

#[derive(Clone)]
pub struct TaskWaiter {
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Default for TaskWaiter {
    fn default() -> Self {
        Self::new(Arc::new(TokioClock))
    }
}

impl TaskWaiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            interval: POLL_INTERVAL,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Poll `task` until it reaches a terminal state or `timeout` elapses.
    ///
    /// Returns the task's result value on success. A timeout is reported as
    /// [`Error::Timeout`] and leaves the remote outcome unknown.
    pub async fn wait(
        &self,
        session: &dyn Session,
        task: &TaskRef,
        timeout: Duration,
    ) -> Result<Option<Value>> {
        let started = self.clock.now();
        loop {
            let info = session.task_info(task).await?;
            let elapsed = self.clock.now().saturating_duration_since(started);
            match advance(&info, elapsed, timeout, self.interval) {
                Step::Finished(result) => return Ok(result),
                Step::Failed(message) => return Err(Error::TaskFailed(message)),
                Step::TimedOut => return Err(Error::Timeout(timeout)),
                Step::Sleep(d) => {
                    debug!(endpoint = session.target(), state = ?info.state, "task still running");
                    self.clock.sleep(d).await;
                }
            }
        }
    }
}
