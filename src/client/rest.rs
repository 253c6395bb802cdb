//! vSphere Automation REST binding.
//!
//! Covers session lifecycle, VM/host inventory, power, deletion,
//! reconfiguration, clone, relocation and CIS task polling. Alarms, event
//! history, diagnostic logs, snapshots and VM creation are not exposed by the
//! REST API and fall back to the `Unsupported` defaults.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    Connector, DiskInfo, GuestShutdown, HostSummary, PowerState, ReconfigureSpec, Session,
    TaskInfo, TaskRef, TaskState, VmInfo, VmSummary,
};
use crate::config::TargetConfig;
use crate::error::{Error, Result};

const SESSION_HEADER: &str = "vmware-api-session-id";

// ---------------------------------------------------------------------------
// Connector
// ---------------------------------------------------------------------------

/// Builds one HTTP client per session so the permissive TLS setting of one
/// target never leaks to another.
pub struct RestConnector {
    timeout: Duration,
}

impl RestConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for RestConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait::async_trait]
impl Connector for RestConnector {
    async fn connect(&self, target: &TargetConfig, password: &str) -> Result<Arc<dyn Session>> {
        let client = Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(!target.verify_tls)
            .build()
            .map_err(|e| Error::connection(&target.name, e))?;

        let base = target.base_url();
        let resp = client
            .post(format!("{base}/api/session"))
            .basic_auth(&target.username, Some(password))
            .send()
            .await
            .map_err(|e| Error::connection(&target.name, e))?;

        if !resp.status().is_success() {
            return Err(Error::connection(
                &target.name,
                format!("authentication failed: HTTP {}", resp.status()),
            ));
        }
        let token: String = resp
            .json()
            .await
            .map_err(|e| Error::connection(&target.name, e))?;

        debug!(endpoint = %target.name, host = %target.host, "REST session established");
        Ok(Arc::new(RestSession {
            target: target.name.clone(),
            base,
            client,
            token,
        }))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct VmListItem {
    vm: String,
    name: String,
    power_state: String,
    cpu_count: Option<u32>,
    #[serde(rename = "memory_size_MiB")]
    memory_size_mib: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct HostListItem {
    host: String,
    name: String,
    connection_state: String,
    power_state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatastoreListItem {
    datastore: String,
}

#[derive(Debug, Deserialize)]
struct VmDetail {
    name: String,
    power_state: String,
    cpu: Option<CpuDetail>,
    memory: Option<MemoryDetail>,
    guest_os: Option<String>,
    #[serde(default)]
    disks: std::collections::HashMap<String, DiskDetail>,
    identity: Option<IdentityDetail>,
}

#[derive(Debug, Deserialize)]
struct CpuDetail {
    count: u32,
}

#[derive(Debug, Deserialize)]
struct MemoryDetail {
    #[serde(rename = "size_MiB")]
    size_mib: u64,
}

#[derive(Debug, Deserialize)]
struct DiskDetail {
    label: Option<String>,
    capacity: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct IdentityDetail {
    bios_uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PowerDetail {
    state: String,
}

#[derive(Debug, Deserialize)]
struct GuestIdentity {
    ip_address: Option<String>,
    host_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CisTask {
    status: String,
    result: Option<Value>,
    error: Option<Value>,
}

fn parse_power_state(target: &str, raw: &str) -> Result<PowerState> {
    match raw {
        "POWERED_ON" => Ok(PowerState::PoweredOn),
        "POWERED_OFF" => Ok(PowerState::PoweredOff),
        "SUSPENDED" => Ok(PowerState::Suspended),
        other => Err(Error::connection(
            target,
            format!("unrecognised power state '{other}'"),
        )),
    }
}

/// Pulls the first localizable message out of a vAPI error body.
fn error_message(body: &Value) -> Option<String> {
    body.get("messages")
        .and_then(|m| m.get(0))
        .and_then(|m| m.get("default_message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct RestSession {
    target: String,
    base: String,
    client: Client,
    token: String,
}

impl RestSession {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base, path))
            .header(SESSION_HEADER, &self.token)
    }

    /// Reads and lookups. Any non-2xx answer is a fault of the endpoint, not
    /// of an operation.
    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let resp = builder
            .send()
            .await
            .map_err(|e| Error::connection(&self.target, e))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = failure_message(resp).await;
        Err(Error::connection(&self.target, message))
    }

    /// Mutating calls. A refusal is reported as a failed operation unless the
    /// session itself was rejected.
    async fn send_op(&self, builder: RequestBuilder) -> Result<Response> {
        let resp = builder
            .send()
            .await
            .map_err(|e| Error::connection(&self.target, e))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = failure_message(resp).await;
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::connection(&self.target, message))
            }
            _ => Err(Error::TaskFailed(message)),
        }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let resp = self.send(builder).await?;
        Ok(resp.json().await?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.fetch(self.request(Method::GET, path)).await
    }

    async fn vms_named(&self, name: &str, host_id: Option<&str>) -> Result<Vec<VmListItem>> {
        let mut builder = self
            .request(Method::GET, "/api/vcenter/vm")
            .query(&[("names", name)]);
        if let Some(host_id) = host_id {
            builder = builder.query(&[("hosts", host_id)]);
        }
        self.fetch(builder).await
    }

    async fn vm_id(&self, name: &str) -> Result<Option<String>> {
        let items = self.vms_named(name, None).await?;
        Ok(items.into_iter().find(|v| v.name == name).map(|v| v.vm))
    }

    async fn require_vm(&self, name: &str) -> Result<String> {
        self.vm_id(name)
            .await?
            .ok_or_else(|| Error::not_found("VM", name))
    }

    async fn host_id(&self, name: &str) -> Result<Option<String>> {
        let items: Vec<HostListItem> = self
            .fetch(
                self.request(Method::GET, "/api/vcenter/host")
                    .query(&[("names", name)]),
            )
            .await?;
        Ok(items.into_iter().find(|h| h.name == name).map(|h| h.host))
    }

    /// Name of the host running VM `id`. The VM summary does not carry its
    /// placement, so each host is asked in turn.
    async fn vm_host(&self, id: &str, name: &str) -> Result<Option<String>> {
        let hosts: Vec<HostListItem> = self.get_json("/api/vcenter/host").await?;
        for host in hosts {
            let items = self.vms_named(name, Some(&host.host)).await?;
            if items.iter().any(|v| v.vm == id) {
                return Ok(Some(host.name));
            }
        }
        Ok(None)
    }

    async fn vm_power_action(&self, vm: &str, action: &str) -> Result<TaskRef> {
        let id = self.require_vm(vm).await?;
        self.send_op(
            self.request(Method::POST, &format!("/api/vcenter/vm/{id}/power"))
                .query(&[("action", action)]),
        )
        .await?;
        Ok(TaskRef::Completed(None))
    }

    /// Task ids come back as a bare JSON string.
    async fn start_task(&self, builder: RequestBuilder) -> Result<TaskRef> {
        let resp = self.send_op(builder).await?;
        let id: String = resp.json().await?;
        Ok(TaskRef::Remote(id))
    }
}

/// First vAPI message of an error response, or the bare status.
async fn failure_message(resp: Response) -> String {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    error_message(&body).unwrap_or_else(|| format!("HTTP {status}"))
}

#[async_trait::async_trait]
impl Session for RestSession {
    fn target(&self) -> &str {
        &self.target
    }

    async fn probe(&self) -> Result<()> {
        self.send(self.request(Method::GET, "/api/session")).await?;
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.send(self.request(Method::DELETE, "/api/session")).await?;
        debug!(endpoint = %self.target, "REST session closed");
        Ok(())
    }

    async fn task_info(&self, task: &TaskRef) -> Result<TaskInfo> {
        let id = match task {
            TaskRef::Completed(result) => return Ok(TaskInfo::succeeded(result.clone())),
            TaskRef::Remote(id) => id,
        };
        let task: CisTask = self.get_json(&format!("/api/cis/tasks/{id}")).await?;
        let state = match task.status.as_str() {
            "PENDING" | "BLOCKED" => TaskState::Queued,
            "RUNNING" => TaskState::Running,
            "SUCCEEDED" => TaskState::Success,
            _ => TaskState::Error,
        };
        Ok(TaskInfo {
            state,
            result: task.result,
            error: task.error.as_ref().and_then(error_message),
        })
    }

    async fn list_hosts(&self) -> Result<Vec<HostSummary>> {
        let items: Vec<HostListItem> = self.get_json("/api/vcenter/host").await?;
        Ok(items
            .into_iter()
            .map(|h| HostSummary {
                name: h.name,
                connection_state: h.connection_state.to_ascii_lowercase(),
                power_state: h
                    .power_state
                    .map(|p| p.to_ascii_lowercase())
                    .unwrap_or_else(|| "unknown".to_string()),
                vm_count: None,
                has_diagnostics: false,
            })
            .collect())
    }

    async fn list_vms(&self) -> Result<Vec<VmSummary>> {
        let items: Vec<VmListItem> = self.get_json("/api/vcenter/vm").await?;
        items
            .into_iter()
            .map(|v| {
                Ok(VmSummary {
                    power_state: parse_power_state(&self.target, &v.power_state)?,
                    name: v.name,
                    cpu: v.cpu_count.unwrap_or(0),
                    memory_mb: v.memory_size_mib.unwrap_or(0),
                    guest_os: None,
                    ip_address: None,
                    host: None,
                })
            })
            .collect()
    }

    async fn vm_info(&self, vm: &str) -> Result<Option<VmInfo>> {
        let Some(id) = self.vm_id(vm).await? else {
            return Ok(None);
        };
        let detail: VmDetail = self.get_json(&format!("/api/vcenter/vm/{id}")).await?;
        let host = self.vm_host(&id, vm).await?;
        // Guest identity needs running tools; absence is normal.
        let guest: Option<GuestIdentity> = self
            .get_json(&format!("/api/vcenter/vm/{id}/guest/identity"))
            .await
            .ok();

        let disks = detail
            .disks
            .into_values()
            .map(|d| DiskInfo {
                label: d.label.unwrap_or_default(),
                size_gb: d
                    .capacity
                    .map(|bytes| (bytes as f64 / 1024f64.powi(3) * 10.0).round() / 10.0)
                    .unwrap_or(0.0),
            })
            .collect();

        Ok(Some(VmInfo {
            name: detail.name,
            power_state: parse_power_state(&self.target, &detail.power_state)?,
            cpu: detail.cpu.map(|c| c.count).unwrap_or(0),
            memory_mb: detail.memory.map(|m| m.size_mib).unwrap_or(0),
            guest_os: detail.guest_os.clone(),
            guest_id: detail.guest_os,
            uuid: detail.identity.and_then(|i| i.bios_uuid),
            host,
            ip_address: guest.as_ref().and_then(|g| g.ip_address.clone()),
            hostname: guest.and_then(|g| g.host_name),
            tools_status: None,
            disks,
            annotation: None,
            snapshot_count: None,
        }))
    }

    async fn find_datastore(&self, name: &str) -> Result<Option<String>> {
        let items: Vec<DatastoreListItem> = self
            .fetch(
                self.request(Method::GET, "/api/vcenter/datastore")
                    .query(&[("names", name)]),
            )
            .await?;
        Ok(items.into_iter().next().map(|d| d.datastore))
    }

    async fn power_state(&self, vm: &str) -> Result<PowerState> {
        let id = self.require_vm(vm).await?;
        let power: PowerDetail = self
            .get_json(&format!("/api/vcenter/vm/{id}/power"))
            .await?;
        parse_power_state(&self.target, &power.state)
    }

    async fn power_on(&self, vm: &str) -> Result<TaskRef> {
        self.vm_power_action(vm, "start").await
    }

    async fn power_off(&self, vm: &str) -> Result<TaskRef> {
        self.vm_power_action(vm, "stop").await
    }

    async fn reset(&self, vm: &str) -> Result<TaskRef> {
        self.vm_power_action(vm, "reset").await
    }

    async fn suspend(&self, vm: &str) -> Result<TaskRef> {
        self.vm_power_action(vm, "suspend").await
    }

    async fn shutdown_guest(&self, vm: &str) -> Result<GuestShutdown> {
        let id = self.require_vm(vm).await?;
        let resp = self
            .request(
                Method::POST,
                &format!("/api/vcenter/vm/{id}/guest/power?action=shutdown"),
            )
            .send()
            .await
            .map_err(|e| Error::connection(&self.target, e))?;
        match resp.status() {
            s if s.is_success() => Ok(GuestShutdown::Initiated),
            StatusCode::SERVICE_UNAVAILABLE => Ok(GuestShutdown::ToolsUnavailable),
            s => {
                let body: Value = resp.json().await.unwrap_or(Value::Null);
                Err(Error::TaskFailed(
                    error_message(&body).unwrap_or_else(|| format!("HTTP {s}")),
                ))
            }
        }
    }

    async fn destroy_vm(&self, vm: &str) -> Result<TaskRef> {
        let id = self.require_vm(vm).await?;
        self.send_op(self.request(Method::DELETE, &format!("/api/vcenter/vm/{id}")))
            .await?;
        Ok(TaskRef::Completed(None))
    }

    async fn reconfigure_vm(&self, vm: &str, spec: &ReconfigureSpec) -> Result<TaskRef> {
        let id = self.require_vm(vm).await?;
        if let Some(count) = spec.cpu {
            self.send_op(
                self.request(Method::PATCH, &format!("/api/vcenter/vm/{id}/hardware/cpu"))
                    .json(&json!({ "count": count })),
            )
            .await?;
        }
        if let Some(size) = spec.memory_mb {
            self.send_op(
                self.request(
                    Method::PATCH,
                    &format!("/api/vcenter/vm/{id}/hardware/memory"),
                )
                .json(&json!({ "size_MiB": size })),
            )
            .await?;
        }
        Ok(TaskRef::Completed(None))
    }

    async fn clone_vm(&self, vm: &str, new_name: &str) -> Result<TaskRef> {
        let id = self.require_vm(vm).await?;
        self.start_task(
            self.request(Method::POST, "/api/vcenter/vm?action=clone&vmw-task=true")
                .json(&json!({ "source": id, "name": new_name, "power_on": false })),
        )
        .await
    }

    async fn relocate_vm(&self, vm: &str, host: &str) -> Result<TaskRef> {
        let id = self.require_vm(vm).await?;
        let host_id = self
            .host_id(host)
            .await?
            .ok_or_else(|| Error::not_found("host", host))?;
        self.start_task(
            self.request(
                Method::POST,
                &format!("/api/vcenter/vm/{id}?action=relocate&vmw-task=true"),
            )
            .json(&json!({ "placement": { "host": host_id } })),
        )
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
