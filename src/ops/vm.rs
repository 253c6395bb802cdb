//! VM lifecycle operations.
//!
//! Each operation checks the current state, issues at most the remote calls
//! it needs, waits for their tasks and reports an [`Outcome`]. Operations
//! that would not change anything return a no-op outcome without touching
//! the endpoint.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::client::{
    CreateVmSpec, GuestShutdown, PowerState, ReconfigureSpec, Session, SnapshotNode, SnapshotSpec,
    VmInfo,
};
use crate::error::{Error, Result};
use crate::task::{TaskWaiter, DEFAULT_TIMEOUT, LONG_TIMEOUT, POLL_INTERVAL};

/// Guest shutdown is polled this many times at [`POLL_INTERVAL`] (120 s).
const GRACEFUL_POLLS: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// The endpoint state changed.
    Changed,
    /// Already in the requested state; nothing was sent.
    NoOp,
    /// Started but not confirmed, with a suggestion for the operator.
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub message: String,
}

impl Outcome {
    fn changed(message: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Changed,
            message: message.into(),
        }
    }

    pub(crate) fn no_op(message: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::NoOp,
            message: message.into(),
        }
    }

    fn advisory(message: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Advisory,
            message: message.into(),
        }
    }
}

/// One row of a flattened snapshot tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub id: String,
    pub name: String,
    pub description: String,
    pub created: DateTime<Utc>,
    pub depth: usize,
}

/// Pre-order walk with an explicit `(node, depth)` stack.
pub fn flatten_snapshots(roots: &[SnapshotNode]) -> Vec<SnapshotEntry> {
    let mut out = Vec::new();
    let mut stack: Vec<(&SnapshotNode, usize)> = roots.iter().rev().map(|n| (n, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        out.push(SnapshotEntry {
            id: node.id.clone(),
            name: node.name.clone(),
            description: node.description.clone(),
            created: node.created,
            depth,
        });
        stack.extend(node.children.iter().rev().map(|c| (c, depth + 1)));
    }
    out
}

pub struct VmOps<'a> {
    session: &'a dyn Session,
    waiter: &'a TaskWaiter,
}

impl<'a> VmOps<'a> {
    pub fn new(session: &'a dyn Session, waiter: &'a TaskWaiter) -> Self {
        Self { session, waiter }
    }

    async fn wait(&self, task: crate::client::TaskRef, timeout: Duration) -> Result<()> {
        self.waiter.wait(self.session, &task, timeout).await?;
        Ok(())
    }

    pub async fn info(&self, vm: &str) -> Result<VmInfo> {
        self.session
            .vm_info(vm)
            .await?
            .ok_or_else(|| Error::not_found("VM", vm))
    }

    pub async fn power_on(&self, vm: &str) -> Result<Outcome> {
        if self.session.power_state(vm).await? == PowerState::PoweredOn {
            return Ok(Outcome::no_op(format!("VM '{vm}' is already powered on.")));
        }
        let task = self.session.power_on(vm).await?;
        self.wait(task, DEFAULT_TIMEOUT).await?;
        info!(vm, "powered on");
        Ok(Outcome::changed(format!("VM '{vm}' powered on successfully.")))
    }

    /// Hard power-off with `force`, otherwise a guest shutdown polled for up
    /// to 120 s. Never escalates to force on its own.
    pub async fn power_off(&self, vm: &str, force: bool) -> Result<Outcome> {
        if self.session.power_state(vm).await? == PowerState::PoweredOff {
            return Ok(Outcome::no_op(format!("VM '{vm}' is already powered off.")));
        }

        if force {
            let task = self.session.power_off(vm).await?;
            self.wait(task, DEFAULT_TIMEOUT).await?;
            return Ok(Outcome::changed(format!("VM '{vm}' force powered off.")));
        }

        match self.session.shutdown_guest(vm).await? {
            GuestShutdown::ToolsUnavailable => Ok(Outcome::advisory(format!(
                "VMware Tools not running on '{vm}'. Use --force for hard power off."
            ))),
            GuestShutdown::Initiated => {
                let clock = self.waiter.clock();
                for _ in 0..GRACEFUL_POLLS {
                    clock.sleep(POLL_INTERVAL).await;
                    if self.session.power_state(vm).await? == PowerState::PoweredOff {
                        return Ok(Outcome::changed(format!("VM '{vm}' gracefully shut down.")));
                    }
                }
                Ok(Outcome::advisory(format!(
                    "VM '{vm}' shutdown initiated but still running after 120s. Use --force if needed."
                )))
            }
        }
    }

    pub async fn reset(&self, vm: &str) -> Result<Outcome> {
        self.session.power_state(vm).await?;
        let task = self.session.reset(vm).await?;
        self.wait(task, DEFAULT_TIMEOUT).await?;
        Ok(Outcome::changed(format!("VM '{vm}' reset successfully.")))
    }

    pub async fn suspend(&self, vm: &str) -> Result<Outcome> {
        self.session.power_state(vm).await?;
        let task = self.session.suspend(vm).await?;
        self.wait(task, DEFAULT_TIMEOUT).await?;
        Ok(Outcome::changed(format!("VM '{vm}' suspended successfully.")))
    }

    pub async fn create(&self, spec: &CreateVmSpec) -> Result<Outcome> {
        if let Some(ds) = &spec.datastore {
            if self.session.find_datastore(ds).await?.is_none() {
                return Err(Error::not_found("datastore", ds.as_str()));
            }
        }
        let task = self.session.create_vm(spec).await?;
        self.wait(task, DEFAULT_TIMEOUT).await?;
        Ok(Outcome::changed(format!(
            "VM '{}' created successfully (CPU: {}, Mem: {}MB, Disk: {}GB).",
            spec.name, spec.cpu, spec.memory_mb, spec.disk_gb
        )))
    }

    /// Powers the VM off first when it is running.
    pub async fn delete(&self, vm: &str) -> Result<Outcome> {
        if self.session.power_state(vm).await? == PowerState::PoweredOn {
            debug!(vm, "powering off before delete");
            let task = self.session.power_off(vm).await?;
            self.wait(task, DEFAULT_TIMEOUT).await?;
        }
        let task = self.session.destroy_vm(vm).await?;
        self.wait(task, DEFAULT_TIMEOUT).await?;
        Ok(Outcome::changed(format!("VM '{vm}' deleted successfully.")))
    }

    pub async fn reconfigure(&self, vm: &str, spec: &ReconfigureSpec) -> Result<Outcome> {
        self.session.power_state(vm).await?;
        if spec.is_empty() {
            return Ok(Outcome::no_op(
                "Nothing to change. Specify --cpu and/or --memory.",
            ));
        }
        let mut changes = Vec::new();
        if let Some(cpu) = spec.cpu {
            changes.push(format!("CPU: {cpu}"));
        }
        if let Some(mem) = spec.memory_mb {
            changes.push(format!("Memory: {mem}MB"));
        }
        let task = self.session.reconfigure_vm(vm, spec).await?;
        self.wait(task, DEFAULT_TIMEOUT).await?;
        Ok(Outcome::changed(format!(
            "VM '{vm}' reconfigured: {}.",
            changes.join(", ")
        )))
    }

    pub async fn list_snapshots(&self, vm: &str) -> Result<Vec<SnapshotEntry>> {
        self.session.power_state(vm).await?;
        let tree = self.session.snapshot_tree(vm).await?;
        Ok(flatten_snapshots(&tree))
    }

    async fn find_snapshot(&self, vm: &str, name: &str) -> Result<SnapshotEntry> {
        let snapshots = self.list_snapshots(vm).await?;
        let available: Vec<String> = snapshots.iter().map(|s| s.name.clone()).collect();
        snapshots
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::not_found_among("snapshot", name, available))
    }

    pub async fn create_snapshot(&self, vm: &str, spec: &SnapshotSpec) -> Result<Outcome> {
        self.session.power_state(vm).await?;
        let task = self.session.create_snapshot(vm, spec).await?;
        self.wait(task, DEFAULT_TIMEOUT).await?;
        Ok(Outcome::changed(format!(
            "Snapshot '{}' created for VM '{vm}'.",
            spec.name
        )))
    }

    pub async fn revert_snapshot(&self, vm: &str, name: &str) -> Result<Outcome> {
        let snapshot = self.find_snapshot(vm, name).await?;
        let task = self.session.revert_snapshot(vm, &snapshot.id).await?;
        self.wait(task, DEFAULT_TIMEOUT).await?;
        Ok(Outcome::changed(format!(
            "VM '{vm}' reverted to snapshot '{name}'."
        )))
    }

    pub async fn delete_snapshot(
        &self,
        vm: &str,
        name: &str,
        remove_children: bool,
    ) -> Result<Outcome> {
        let snapshot = self.find_snapshot(vm, name).await?;
        let task = self
            .session
            .remove_snapshot(vm, &snapshot.id, remove_children)
            .await?;
        self.wait(task, DEFAULT_TIMEOUT).await?;
        Ok(Outcome::changed(format!(
            "Snapshot '{name}' deleted from VM '{vm}'."
        )))
    }

    pub async fn clone(&self, vm: &str, new_name: &str) -> Result<Outcome> {
        self.session.power_state(vm).await?;
        let task = self.session.clone_vm(vm, new_name).await?;
        self.wait(task, LONG_TIMEOUT).await?;
        Ok(Outcome::changed(format!("VM '{vm}' cloned as '{new_name}'.")))
    }

    pub async fn migrate(&self, vm: &str, host: &str) -> Result<Outcome> {
        let info = self.info(vm).await?;
        if self.session.find_host(host).await?.is_none() {
            return Err(Error::not_found("host", host));
        }
        let current = info.host.unwrap_or_else(|| "unknown".to_string());
        if current == host {
            return Ok(Outcome::no_op(format!(
                "VM '{vm}' is already on host '{host}'."
            )));
        }
        let task = self.session.relocate_vm(vm, host).await?;
        self.wait(task, LONG_TIMEOUT).await?;
        Ok(Outcome::changed(format!(
            "VM '{vm}' migrated from '{current}' to '{host}'."
        )))
    }
}
