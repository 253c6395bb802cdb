//! In-memory endpoint binding shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};

use vmware_aiops::client::{
    AlarmState, Connector, EntityKind, EntityRef, GuestShutdown, HostSummary, PowerState,
    RawEvent, ReconfigureSpec, Session, SnapshotNode, SnapshotSpec, TaskInfo, TaskRef, VmInfo,
    VmSummary,
};
use vmware_aiops::config::{AppConfig, AuditConfig, NotifyConfig, TargetConfig, TargetKind};
use vmware_aiops::confirm::Prompter;
use vmware_aiops::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct FakeVm {
    pub power: PowerState,
    pub host: String,
    pub cpu: u32,
    pub memory_mb: u64,
    pub tools_running: bool,
    pub snapshots: Vec<SnapshotNode>,
}

impl FakeVm {
    pub fn new(power: PowerState, host: &str) -> Self {
        Self {
            power,
            host: host.to_string(),
            cpu: 2,
            memory_mb: 4096,
            tools_running: true,
            snapshots: Vec::new(),
        }
    }
}

#[derive(Default)]
pub struct FleetState {
    pub vms: BTreeMap<String, FakeVm>,
    pub hosts: Vec<HostSummary>,
    /// Alarms triggered on the root folder.
    pub alarms: Vec<AlarmState>,
    pub events: Vec<RawEvent>,
    pub logs: HashMap<(String, String), Vec<String>>,
    /// Mutating calls in order, as `op:vm`.
    pub calls: Vec<String>,
    /// How long reading the root folder takes. Stretches a scan cycle.
    pub scan_delay: Option<Duration>,
    pub logouts: usize,
}

/// Shared state behind every session handed out for one target.
#[derive(Clone, Default)]
pub struct Fleet(Arc<Mutex<FleetState>>);

impl Fleet {
    pub fn lock(&self) -> MutexGuard<'_, FleetState> {
        self.0.lock().unwrap()
    }

    pub fn with<F: FnOnce(&mut FleetState)>(self, f: F) -> Self {
        f(&mut self.lock());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn power(&self, vm: &str) -> Option<PowerState> {
        self.lock().vms.get(vm).map(|v| v.power)
    }
}

pub struct FakeSession {
    name: String,
    fleet: Fleet,
}

impl FakeSession {
    fn record(&self, op: &str, vm: &str) {
        self.fleet.lock().calls.push(format!("{op}:{vm}"));
    }

    fn set_power(&self, vm: &str, power: PowerState) -> Result<TaskRef> {
        let mut state = self.fleet.lock();
        let entry = state
            .vms
            .get_mut(vm)
            .ok_or_else(|| Error::not_found("VM", vm))?;
        entry.power = power;
        Ok(TaskRef::Completed(None))
    }
}

fn root() -> EntityRef {
    EntityRef {
        id: "group-d1".into(),
        name: "Datacenters".into(),
        kind: EntityKind::Folder,
    }
}

#[async_trait::async_trait]
impl Session for FakeSession {
    fn target(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.fleet.lock().logouts += 1;
        Ok(())
    }

    async fn task_info(&self, _task: &TaskRef) -> Result<TaskInfo> {
        Ok(TaskInfo::succeeded(None))
    }

    async fn root_folder(&self) -> Result<EntityRef> {
        let delay = self.fleet.lock().scan_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(root())
    }

    async fn entities(&self, _kind: EntityKind) -> Result<Vec<EntityRef>> {
        Ok(Vec::new())
    }

    async fn triggered_alarms(&self, entity: &EntityRef) -> Result<Vec<AlarmState>> {
        if entity.id != root().id {
            return Ok(Vec::new());
        }
        Ok(self.fleet.lock().alarms.clone())
    }

    async fn query_events(
        &self,
        _begin: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>> {
        Ok(self.fleet.lock().events.clone())
    }

    async fn browse_diagnostic_log(
        &self,
        host: &str,
        key: &str,
        _lines: usize,
    ) -> Result<Vec<String>> {
        self.fleet
            .lock()
            .logs
            .get(&(host.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| Error::not_found("diagnostic log", key))
    }

    async fn list_hosts(&self) -> Result<Vec<HostSummary>> {
        Ok(self.fleet.lock().hosts.clone())
    }

    async fn list_vms(&self) -> Result<Vec<VmSummary>> {
        Ok(self
            .fleet
            .lock()
            .vms
            .iter()
            .map(|(name, vm)| VmSummary {
                name: name.clone(),
                power_state: vm.power,
                cpu: vm.cpu,
                memory_mb: vm.memory_mb,
                guest_os: None,
                ip_address: None,
                host: Some(vm.host.clone()),
            })
            .collect())
    }

    async fn vm_info(&self, vm: &str) -> Result<Option<VmInfo>> {
        Ok(self.fleet.lock().vms.get(vm).map(|v| VmInfo {
            name: vm.to_string(),
            power_state: v.power,
            cpu: v.cpu,
            memory_mb: v.memory_mb,
            guest_os: None,
            guest_id: None,
            uuid: None,
            host: Some(v.host.clone()),
            ip_address: None,
            hostname: None,
            tools_status: None,
            disks: Vec::new(),
            annotation: None,
            snapshot_count: Some(v.snapshots.len()),
        }))
    }

    async fn power_on(&self, vm: &str) -> Result<TaskRef> {
        self.record("power_on", vm);
        self.set_power(vm, PowerState::PoweredOn)
    }

    async fn power_off(&self, vm: &str) -> Result<TaskRef> {
        self.record("power_off", vm);
        self.set_power(vm, PowerState::PoweredOff)
    }

    async fn shutdown_guest(&self, vm: &str) -> Result<GuestShutdown> {
        self.record("shutdown_guest", vm);
        let tools = self
            .fleet
            .lock()
            .vms
            .get(vm)
            .map(|v| v.tools_running)
            .unwrap_or(false);
        if !tools {
            return Ok(GuestShutdown::ToolsUnavailable);
        }
        self.set_power(vm, PowerState::PoweredOff)?;
        Ok(GuestShutdown::Initiated)
    }

    async fn destroy_vm(&self, vm: &str) -> Result<TaskRef> {
        self.record("destroy_vm", vm);
        self.fleet
            .lock()
            .vms
            .remove(vm)
            .ok_or_else(|| Error::not_found("VM", vm))?;
        Ok(TaskRef::Completed(None))
    }

    async fn reconfigure_vm(&self, vm: &str, spec: &ReconfigureSpec) -> Result<TaskRef> {
        self.record("reconfigure_vm", vm);
        let mut state = self.fleet.lock();
        let entry = state
            .vms
            .get_mut(vm)
            .ok_or_else(|| Error::not_found("VM", vm))?;
        if let Some(cpu) = spec.cpu {
            entry.cpu = cpu;
        }
        if let Some(mem) = spec.memory_mb {
            entry.memory_mb = mem;
        }
        Ok(TaskRef::Completed(None))
    }

    async fn snapshot_tree(&self, vm: &str) -> Result<Vec<SnapshotNode>> {
        self.fleet
            .lock()
            .vms
            .get(vm)
            .map(|v| v.snapshots.clone())
            .ok_or_else(|| Error::not_found("VM", vm))
    }

    async fn create_snapshot(&self, vm: &str, spec: &SnapshotSpec) -> Result<TaskRef> {
        self.record("create_snapshot", vm);
        let mut state = self.fleet.lock();
        let entry = state
            .vms
            .get_mut(vm)
            .ok_or_else(|| Error::not_found("VM", vm))?;
        let id = format!("snapshot-{}", entry.snapshots.len() + 1);
        entry.snapshots.push(snapshot(&id, &spec.name, Vec::new()));
        Ok(TaskRef::Completed(None))
    }

    async fn revert_snapshot(&self, vm: &str, _snapshot_id: &str) -> Result<TaskRef> {
        self.record("revert_snapshot", vm);
        Ok(TaskRef::Completed(None))
    }

    async fn remove_snapshot(
        &self,
        vm: &str,
        _snapshot_id: &str,
        _remove_children: bool,
    ) -> Result<TaskRef> {
        self.record("remove_snapshot", vm);
        Ok(TaskRef::Completed(None))
    }

    async fn relocate_vm(&self, vm: &str, host: &str) -> Result<TaskRef> {
        self.record("relocate_vm", vm);
        let mut state = self.fleet.lock();
        if let Some(entry) = state.vms.get_mut(vm) {
            entry.host = host.to_string();
        }
        Ok(TaskRef::Completed(None))
    }
}

/// Hands out sessions bound to per-target fleets. Targets listed as
/// unreachable fail to connect.
#[derive(Default)]
pub struct FakeConnector {
    fleets: Mutex<HashMap<String, Fleet>>,
    unreachable: HashSet<String>,
    pub connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fleet(self, target: &str, fleet: Fleet) -> Self {
        self.fleets.lock().unwrap().insert(target.to_string(), fleet);
        self
    }

    pub fn unreachable(mut self, target: &str) -> Self {
        self.unreachable.insert(target.to_string());
        self
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, target: &TargetConfig, _password: &str) -> Result<Arc<dyn Session>> {
        if self.unreachable.contains(&target.name) {
            return Err(Error::connection(&target.name, "connection refused"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let fleet = self
            .fleets
            .lock()
            .unwrap()
            .entry(target.name.clone())
            .or_default()
            .clone();
        Ok(Arc::new(FakeSession {
            name: target.name.clone(),
            fleet,
        }))
    }
}

/// Answers prompts from a fixed script, "no" once it runs out.
pub struct ScriptedPrompter {
    answers: Mutex<Vec<bool>>,
    pub asked: AtomicUsize,
}

impl ScriptedPrompter {
    pub fn new(answers: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().rev().copied().collect()),
            asked: AtomicUsize::new(0),
        })
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, _prompt: &str) -> Result<bool> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.answers.lock().unwrap().pop().unwrap_or(false))
    }

    fn present(&self, _text: &str) {}
}

pub fn target(name: &str) -> TargetConfig {
    TargetConfig {
        name: name.to_string(),
        host: format!("{name}.lab.local"),
        username: "administrator@vsphere.local".into(),
        kind: TargetKind::Vcenter,
        port: 443,
        verify_tls: false,
    }
}

/// Config for `names` with logs under `dir`. Sets each target's password
/// variable.
pub fn config(names: &[&str], dir: &Path) -> AppConfig {
    for name in names {
        std::env::set_var(target(name).password_env(), "test-password");
    }
    AppConfig {
        targets: names.iter().map(|n| target(n)).collect(),
        notify: NotifyConfig {
            log_file: dir.join("scan.log"),
            ..Default::default()
        },
        audit: AuditConfig {
            log_file: dir.join("audit.log"),
        },
        ..Default::default()
    }
}

pub fn host(name: &str) -> HostSummary {
    HostSummary {
        name: name.to_string(),
        connection_state: "connected".into(),
        power_state: "poweredOn".into(),
        vm_count: Some(0),
        has_diagnostics: true,
    }
}

pub fn snapshot(id: &str, name: &str, children: Vec<SnapshotNode>) -> SnapshotNode {
    SnapshotNode {
        id: id.to_string(),
        name: name.to_string(),
        description: String::new(),
        created: Utc::now(),
        children,
    }
}

pub fn alarm(name: &str, entity: &str, status: &str, acknowledged: bool) -> AlarmState {
    AlarmState {
        alarm_name: name.to_string(),
        entity: EntityRef {
            id: format!("host-{entity}"),
            name: entity.to_string(),
            kind: EntityKind::Host,
        },
        overall_status: status.to_string(),
        time: Utc::now(),
        acknowledged: Some(acknowledged),
    }
}

pub fn event(event_type: &str, vm: &str) -> RawEvent {
    RawEvent {
        event_type: event_type.to_string(),
        full_message: Some(format!("{event_type} on {vm}")),
        created_time: Utc::now(),
        user_name: None,
        vm: Some(vm.to_string()),
        host: None,
        datastore: None,
    }
}
