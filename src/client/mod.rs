//! Endpoint binding boundary.
//!
//! A [`Connector`] authenticates against one target and yields a
//! [`Session`]. The session exposes the remote primitives the scanners and
//! lifecycle operations are built on. Lookups by name return `Option` so
//! callers decide how a miss is reported. Primitives a binding cannot
//! provide fall through to the default methods, which report
//! [`Error::Unsupported`].

pub mod rest;
#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TargetConfig;
use crate::error::{Error, Result};

pub use rest::RestConnector;

// ---------------------------------------------------------------------------
// Inventory records
// ---------------------------------------------------------------------------

/// Managed entity types walked by the alarm scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Folder,
    Datacenter,
    Cluster,
    Host,
    VirtualMachine,
    Datastore,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Folder => "Folder",
            EntityKind::Datacenter => "Datacenter",
            EntityKind::Cluster => "ClusterComputeResource",
            EntityKind::Host => "HostSystem",
            EntityKind::VirtualMachine => "VirtualMachine",
            EntityKind::Datastore => "Datastore",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    pub name: String,
    pub kind: EntityKind,
}

/// Triggered alarm state attached to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmState {
    pub alarm_name: String,
    pub entity: EntityRef,
    /// Status color: red, yellow, green or gray.
    pub overall_status: String,
    pub time: DateTime<Utc>,
    /// Not every endpoint version reports acknowledgement.
    pub acknowledged: Option<bool>,
}

/// An event as returned by the endpoint's event history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub event_type: String,
    pub full_message: Option<String>,
    pub created_time: DateTime<Utc>,
    pub user_name: Option<String>,
    pub vm: Option<String>,
    pub host: Option<String>,
    pub datastore: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PowerState::PoweredOn => "poweredOn",
            PowerState::PoweredOff => "poweredOff",
            PowerState::Suspended => "suspended",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostSummary {
    pub name: String,
    pub connection_state: String,
    pub power_state: String,
    pub vm_count: Option<usize>,
    /// Whether the host exposes a diagnostic log system.
    pub has_diagnostics: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmSummary {
    pub name: String,
    pub power_state: PowerState,
    pub cpu: u32,
    pub memory_mb: u64,
    pub guest_os: Option<String>,
    pub ip_address: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskInfo {
    pub label: String,
    pub size_gb: f64,
}

/// Detailed VM state, used for inspection and audit before/after snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmInfo {
    pub name: String,
    pub power_state: PowerState,
    pub cpu: u32,
    pub memory_mb: u64,
    pub guest_os: Option<String>,
    pub guest_id: Option<String>,
    pub uuid: Option<String>,
    pub host: Option<String>,
    pub ip_address: Option<String>,
    pub hostname: Option<String>,
    pub tools_status: Option<String>,
    pub disks: Vec<DiskInfo>,
    pub annotation: Option<String>,
    pub snapshot_count: Option<usize>,
}

/// One node of a VM's snapshot tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created: DateTime<Utc>,
    pub children: Vec<SnapshotNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateVmSpec {
    pub name: String,
    pub cpu: u32,
    pub memory_mb: u64,
    pub disk_gb: u64,
    pub network: String,
    pub datastore: Option<String>,
    pub folder: Option<String>,
    pub guest_id: String,
}

impl CreateVmSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cpu: 2,
            memory_mb: 4096,
            disk_gb: 40,
            network: "VM Network".to_string(),
            datastore: None,
            folder: None,
            guest_id: "otherGuest64".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconfigureSpec {
    pub cpu: Option<u32>,
    pub memory_mb: Option<u64>,
}

impl ReconfigureSpec {
    pub fn is_empty(&self) -> bool {
        self.cpu.is_none() && self.memory_mb.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSpec {
    pub name: String,
    pub description: String,
    pub memory: bool,
}

/// Outcome of asking the guest OS to shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestShutdown {
    Initiated,
    ToolsUnavailable,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Handle to a remote operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskRef {
    /// A task tracked by the endpoint, polled by id.
    Remote(String),
    /// The endpoint completed the call synchronously.
    Completed(Option<serde_json::Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Success | TaskState::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub state: TaskState,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl TaskInfo {
    pub fn succeeded(result: Option<serde_json::Value>) -> Self {
        Self {
            state: TaskState::Success,
            result,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Creates authenticated sessions.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Authenticate against `target`. TLS verification follows
    /// `target.verify_tls` for this session only.
    async fn connect(&self, target: &TargetConfig, password: &str) -> Result<Arc<dyn Session>>;
}

/// A live authenticated handle to one target. Not designed for concurrent
/// use; the session manager hands out one per target.
#[async_trait::async_trait]
pub trait Session: Send + Sync {
    /// Name of the target this session is bound to.
    fn target(&self) -> &str;

    /// Inexpensive round trip proving the session is still authenticated.
    async fn probe(&self) -> Result<()>;

    /// Release server-side session state.
    async fn logout(&self) -> Result<()>;

    async fn task_info(&self, task: &TaskRef) -> Result<TaskInfo>;

    // -- health --------------------------------------------------------------

    async fn root_folder(&self) -> Result<EntityRef> {
        Err(Error::Unsupported("inventory root folder"))
    }

    /// All entities of `kind` under the root folder, recursively.
    async fn entities(&self, _kind: EntityKind) -> Result<Vec<EntityRef>> {
        Err(Error::Unsupported("container views"))
    }

    async fn triggered_alarms(&self, _entity: &EntityRef) -> Result<Vec<AlarmState>> {
        Err(Error::Unsupported("triggered alarm state"))
    }

    async fn query_events(
        &self,
        _begin: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>> {
        Err(Error::Unsupported("event history"))
    }

    /// The most recent `lines` lines of diagnostic log `key` on `host`.
    async fn browse_diagnostic_log(
        &self,
        _host: &str,
        _key: &str,
        _lines: usize,
    ) -> Result<Vec<String>> {
        Err(Error::Unsupported("diagnostic log browsing"))
    }

    // -- inventory -----------------------------------------------------------

    async fn list_hosts(&self) -> Result<Vec<HostSummary>> {
        Err(Error::Unsupported("host inventory"))
    }

    async fn list_vms(&self) -> Result<Vec<VmSummary>> {
        Err(Error::Unsupported("VM inventory"))
    }

    async fn vm_info(&self, _vm: &str) -> Result<Option<VmInfo>> {
        Err(Error::Unsupported("VM details"))
    }

    async fn find_host(&self, name: &str) -> Result<Option<HostSummary>> {
        Ok(self.list_hosts().await?.into_iter().find(|h| h.name == name))
    }

    /// Returns the datastore id when it exists.
    async fn find_datastore(&self, _name: &str) -> Result<Option<String>> {
        Err(Error::Unsupported("datastore lookup"))
    }

    // -- lifecycle -----------------------------------------------------------

    async fn power_state(&self, vm: &str) -> Result<PowerState> {
        self.vm_info(vm)
            .await?
            .map(|info| info.power_state)
            .ok_or_else(|| Error::not_found("VM", vm))
    }

    async fn power_on(&self, _vm: &str) -> Result<TaskRef> {
        Err(Error::Unsupported("power on"))
    }

    async fn power_off(&self, _vm: &str) -> Result<TaskRef> {
        Err(Error::Unsupported("power off"))
    }

    async fn reset(&self, _vm: &str) -> Result<TaskRef> {
        Err(Error::Unsupported("reset"))
    }

    async fn suspend(&self, _vm: &str) -> Result<TaskRef> {
        Err(Error::Unsupported("suspend"))
    }

    async fn shutdown_guest(&self, _vm: &str) -> Result<GuestShutdown> {
        Err(Error::Unsupported("guest shutdown"))
    }

    async fn create_vm(&self, _spec: &CreateVmSpec) -> Result<TaskRef> {
        Err(Error::Unsupported("VM creation"))
    }

    async fn destroy_vm(&self, _vm: &str) -> Result<TaskRef> {
        Err(Error::Unsupported("VM deletion"))
    }

    async fn reconfigure_vm(&self, _vm: &str, _spec: &ReconfigureSpec) -> Result<TaskRef> {
        Err(Error::Unsupported("VM reconfiguration"))
    }

    async fn snapshot_tree(&self, _vm: &str) -> Result<Vec<SnapshotNode>> {
        Err(Error::Unsupported("snapshots"))
    }

    async fn create_snapshot(&self, _vm: &str, _spec: &SnapshotSpec) -> Result<TaskRef> {
        Err(Error::Unsupported("snapshot creation"))
    }

    async fn revert_snapshot(&self, _vm: &str, _snapshot_id: &str) -> Result<TaskRef> {
        Err(Error::Unsupported("snapshot revert"))
    }

    async fn remove_snapshot(
        &self,
        _vm: &str,
        _snapshot_id: &str,
        _remove_children: bool,
    ) -> Result<TaskRef> {
        Err(Error::Unsupported("snapshot removal"))
    }

    async fn clone_vm(&self, _vm: &str, _new_name: &str) -> Result<TaskRef> {
        Err(Error::Unsupported("clone"))
    }

    async fn relocate_vm(&self, _vm: &str, _host: &str) -> Result<TaskRef> {
        Err(Error::Unsupported("migration"))
    }
}
