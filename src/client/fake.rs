//! In-memory session for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::{
    AlarmState, EntityKind, EntityRef, HostSummary, RawEvent, Session, TaskInfo, TaskRef,
};
use crate::error::{Error, Result};

#[derive(Default)]
pub struct FakeState {
    pub root: Option<EntityRef>,
    pub entities: HashMap<EntityKind, Vec<EntityRef>>,
    /// Triggered alarms keyed by entity id.
    pub alarms: HashMap<String, Vec<AlarmState>>,
    /// Entity ids whose alarm lookup fails.
    pub broken_entities: HashSet<String>,
    pub events: Vec<RawEvent>,
    pub hosts: Vec<HostSummary>,
    /// Log lines keyed by (host, key). Missing pairs fail the read.
    pub logs: HashMap<(String, String), Vec<String>>,
    pub event_windows: Vec<(DateTime<Utc>, DateTime<Utc>)>,
}

pub struct FakeSession {
    pub state: Mutex<FakeState>,
}

impl FakeSession {
    pub fn new() -> Self {
        let root = EntityRef {
            id: "group-d1".into(),
            name: "Datacenters".into(),
            kind: EntityKind::Folder,
        };
        Self {
            state: Mutex::new(FakeState {
                root: Some(root),
                ..Default::default()
            }),
        }
    }

    pub fn with<F: FnOnce(&mut FakeState)>(self, f: F) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }
}

#[async_trait::async_trait]
impl Session for FakeSession {
    fn target(&self) -> &str {
        "fake"
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        Ok(())
    }

    async fn task_info(&self, _task: &TaskRef) -> Result<TaskInfo> {
        Ok(TaskInfo::succeeded(None))
    }

    async fn root_folder(&self) -> Result<EntityRef> {
        self.state
            .lock()
            .unwrap()
            .root
            .clone()
            .ok_or(Error::Unsupported("inventory root folder"))
    }

    async fn entities(&self, kind: EntityKind) -> Result<Vec<EntityRef>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .entities
            .get(&kind)
            .cloned()
            .unwrap_or_default())
    }

    async fn triggered_alarms(&self, entity: &EntityRef) -> Result<Vec<AlarmState>> {
        let state = self.state.lock().unwrap();
        if state.broken_entities.contains(&entity.id) {
            return Err(Error::connection("fake", "property collector fault"));
        }
        Ok(state.alarms.get(&entity.id).cloned().unwrap_or_default())
    }

    async fn query_events(&self, begin: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<RawEvent>> {
        let mut state = self.state.lock().unwrap();
        state.event_windows.push((begin, end));
        Ok(state.events.clone())
    }

    async fn browse_diagnostic_log(&self, host: &str, key: &str, _lines: usize) -> Result<Vec<String>> {
        self.state
            .lock()
            .unwrap()
            .logs
            .get(&(host.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found("diagnostic log", key))
    }

    async fn list_hosts(&self) -> Result<Vec<HostSummary>> {
        Ok(self.state.lock().unwrap().hosts.clone())
    }
}
