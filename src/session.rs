//! Per-target session cache.
//!
//! Holds at most one live session per configured target. A cached session is
//! probed before every reuse; a failed probe evicts it and a fresh one is
//! created. All sessions are logged out on [`SessionManager::shutdown`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::{Connector, Session};
use crate::config::{AppConfig, TargetConfig};
use crate::error::{Error, Result};

pub struct SessionManager {
    config: Arc<AppConfig>,
    connector: Arc<dyn Connector>,
    /// Live sessions keyed by target name.
    sessions: Mutex<HashMap<String, Arc<dyn Session>>>,
    closed: AtomicBool,
}

impl SessionManager {
    pub fn new(config: Arc<AppConfig>, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            sessions: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn resolve(&self, target: Option<&str>) -> Result<&TargetConfig> {
        match target {
            Some(name) => self.config.get_target(name),
            None => self.config.default_target(),
        }
    }

    fn ensure_open(&self, target: &str) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::connection(target, "session manager is shut down"));
        }
        Ok(())
    }

    /// Return a live session for `target` (or the first configured target).
    pub async fn connect(&self, target: Option<&str>) -> Result<Arc<dyn Session>> {
        self.ensure_open(target.unwrap_or("default"))?;
        let target = self.resolve(target)?;
        let mut sessions = self.sessions.lock().await;
        // shutdown() may have drained the map while we waited for the lock.
        self.ensure_open(&target.name)?;

        if let Some(existing) = sessions.get(&target.name).cloned() {
            match existing.probe().await {
                Ok(()) => {
                    debug!(endpoint = %target.name, "reusing cached session");
                    return Ok(existing);
                }
                Err(e) => {
                    warn!(endpoint = %target.name, error = %e, "cached session is stale, reconnecting");
                    sessions.remove(&target.name);
                    // Best effort; the server may already have dropped it.
                    let _ = existing.logout().await;
                }
            }
        }

        let password = target.password()?;
        let session = self.connector.connect(target, &password).await?;
        info!(
            endpoint = %target.name,
            host = %target.host,
            verify_tls = target.verify_tls,
            "connected"
        );
        sessions.insert(target.name.clone(), session.clone());
        Ok(session)
    }

    /// Log out and forget the session for `target`. Unknown or unconnected
    /// targets are a no-op.
    pub async fn disconnect(&self, target: &str) {
        let removed = self.sessions.lock().await.remove(target);
        if let Some(session) = removed {
            if let Err(e) = session.logout().await {
                warn!(endpoint = %target, error = %e, "logout failed");
            } else {
                info!(endpoint = %target, "disconnected");
            }
        }
    }

    pub async fn disconnect_all(&self) {
        let drained: Vec<(String, Arc<dyn Session>)> =
            self.sessions.lock().await.drain().collect();
        for (name, session) in drained {
            if let Err(e) = session.logout().await {
                warn!(endpoint = %name, error = %e, "logout failed");
            }
        }
    }

    /// Configured target names, in config order.
    pub fn list_targets(&self) -> Vec<String> {
        self.config.target_names()
    }

    /// Names of targets with a cached session, sorted.
    pub async fn list_connected(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Release every session. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let count = self.sessions.lock().await.len();
        self.disconnect_all().await;
        info!(sessions = count, "session manager shut down");
    }
}
