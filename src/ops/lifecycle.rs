//! Audited execution of lifecycle commands.
//!
//! Every command runs the same pipeline: validate parameters, observe the
//! current state, confirm (destructive commands only), execute, observe
//! again and append one audit entry describing what happened.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::validate;
use super::vm::{Outcome, OutcomeKind, VmOps};
use crate::client::{CreateVmSpec, PowerState, ReconfigureSpec, Session, SnapshotSpec, VmInfo};
use crate::confirm::{ConfirmationGate, Plan};
use crate::error::{Error, Result};
use crate::notify::audit::{
    result_error, AuditEntry, AuditLog, RESULT_ADVISORY, RESULT_NOOP, RESULT_OK,
};
use crate::session::SessionManager;
use crate::task::TaskWaiter;

#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleCommand {
    PowerOn { vm: String },
    PowerOff { vm: String, force: bool },
    Reset { vm: String },
    Suspend { vm: String },
    CreateVm(CreateVmSpec),
    DeleteVm { vm: String },
    ReconfigureVm { vm: String, spec: ReconfigureSpec },
    CreateSnapshot { vm: String, spec: SnapshotSpec },
    RevertSnapshot { vm: String, snapshot: String },
    DeleteSnapshot { vm: String, snapshot: String, remove_children: bool },
    CloneVm { vm: String, new_name: String },
    MigrateVm { vm: String, host: String },
}

impl LifecycleCommand {
    pub fn operation_name(&self) -> &'static str {
        match self {
            Self::PowerOn { .. } => "power_on",
            Self::PowerOff { .. } => "power_off",
            Self::Reset { .. } => "reset",
            Self::Suspend { .. } => "suspend",
            Self::CreateVm(_) => "create_vm",
            Self::DeleteVm { .. } => "delete_vm",
            Self::ReconfigureVm { .. } => "reconfigure_vm",
            Self::CreateSnapshot { .. } => "create_snapshot",
            Self::RevertSnapshot { .. } => "revert_snapshot",
            Self::DeleteSnapshot { .. } => "delete_snapshot",
            Self::CloneVm { .. } => "clone_vm",
            Self::MigrateVm { .. } => "migrate_vm",
        }
    }

    /// The VM the command acts on.
    pub fn resource(&self) -> &str {
        match self {
            Self::CreateVm(spec) => &spec.name,
            Self::PowerOn { vm }
            | Self::PowerOff { vm, .. }
            | Self::Reset { vm }
            | Self::Suspend { vm }
            | Self::DeleteVm { vm }
            | Self::ReconfigureVm { vm, .. }
            | Self::CreateSnapshot { vm, .. }
            | Self::RevertSnapshot { vm, .. }
            | Self::DeleteSnapshot { vm, .. }
            | Self::CloneVm { vm, .. }
            | Self::MigrateVm { vm, .. } => vm,
        }
    }

    pub fn parameters(&self) -> Value {
        match self {
            Self::PowerOff { force, .. } => json!({ "force": force }),
            Self::CreateVm(spec) => json!({
                "cpu": spec.cpu,
                "memory_mb": spec.memory_mb,
                "disk_gb": spec.disk_gb,
                "network": spec.network,
                "datastore": spec.datastore,
                "folder": spec.folder,
                "guest_id": spec.guest_id,
            }),
            Self::ReconfigureVm { spec, .. } => json!({
                "cpu": spec.cpu,
                "memory_mb": spec.memory_mb,
            }),
            Self::CreateSnapshot { spec, .. } => json!({
                "name": spec.name,
                "description": spec.description,
                "memory": spec.memory,
            }),
            Self::RevertSnapshot { snapshot, .. } => json!({ "snapshot": snapshot }),
            Self::DeleteSnapshot {
                snapshot,
                remove_children,
                ..
            } => json!({ "snapshot": snapshot, "remove_children": remove_children }),
            Self::CloneVm { new_name, .. } => json!({ "new_name": new_name }),
            Self::MigrateVm { host, .. } => json!({ "target_host": host }),
            Self::PowerOn { .. } | Self::Reset { .. } | Self::Suspend { .. } | Self::DeleteVm { .. } => {
                json!({})
            }
        }
    }

    /// Commands that need two-step confirmation.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Self::PowerOff { .. }
                | Self::Reset { .. }
                | Self::Suspend { .. }
                | Self::DeleteVm { .. }
                | Self::ReconfigureVm { .. }
                | Self::RevertSnapshot { .. }
                | Self::DeleteSnapshot { .. }
                | Self::MigrateVm { .. }
        )
    }

    /// Check user-supplied values. Names of existing objects are not
    /// checked, only names that are about to be created.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::CreateVm(spec) => {
                validate::name("VM", &spec.name)?;
                validate::cpu(spec.cpu)?;
                validate::memory_mb(spec.memory_mb)?;
                validate::disk_gb(spec.disk_gb)
            }
            Self::ReconfigureVm { spec, .. } => {
                if let Some(cpu) = spec.cpu {
                    validate::cpu(cpu)?;
                }
                if let Some(mem) = spec.memory_mb {
                    validate::memory_mb(mem)?;
                }
                Ok(())
            }
            Self::CreateSnapshot { spec, .. } => validate::name("snapshot", &spec.name),
            Self::CloneVm { new_name, .. } => validate::name("VM", new_name),
            _ => Ok(()),
        }
    }
}

/// Compact state recorded in audit entries and shown in previews.
fn snapshot_state(info: &VmInfo) -> Value {
    json!({
        "power_state": info.power_state,
        "cpu": info.cpu,
        "memory_mb": info.memory_mb,
        "host": info.host,
        "snapshot_count": info.snapshot_count,
    })
}

async fn observe(session: &dyn Session, vm: &str) -> Result<Option<Value>> {
    Ok(session.vm_info(vm).await?.as_ref().map(snapshot_state))
}

impl LifecycleCommand {
    /// Destructive commands whose goal the observed state already meets.
    /// These are answered without asking for confirmation.
    fn already_satisfied(&self, info: &VmInfo) -> Option<Outcome> {
        match self {
            Self::PowerOff { vm, .. } if info.power_state == PowerState::PoweredOff => {
                Some(Outcome::no_op(format!("VM '{vm}' is already powered off.")))
            }
            Self::MigrateVm { vm, host } if info.host.as_deref() == Some(host.as_str()) => Some(
                Outcome::no_op(format!("VM '{vm}' is already on host '{host}'.")),
            ),
            Self::ReconfigureVm { spec, .. } if spec.is_empty() => Some(Outcome::no_op(
                "Nothing to change. Specify --cpu and/or --memory.",
            )),
            _ => None,
        }
    }
}

pub struct LifecycleRunner {
    sessions: Arc<SessionManager>,
    waiter: TaskWaiter,
    gate: ConfirmationGate,
    audit: Arc<AuditLog>,
}

impl LifecycleRunner {
    pub fn new(
        sessions: Arc<SessionManager>,
        waiter: TaskWaiter,
        gate: ConfirmationGate,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            sessions,
            waiter,
            gate,
            audit,
        }
    }

    /// Run `command` and append its audit entry. An operation that succeeds
    /// but cannot be audited is reported as [`Error::AuditWrite`].
    pub async fn run(&self, target: Option<&str>, command: &LifecycleCommand) -> Result<Outcome> {
        command.validate()?;

        let session = self.sessions.connect(target).await?;
        let target_name = session.target().to_string();
        let resource = command.resource();

        let (before, satisfied) = match command {
            LifecycleCommand::CreateVm(_) => (json!({}), None),
            _ => {
                let info = session
                    .vm_info(resource)
                    .await?
                    .ok_or_else(|| Error::not_found("VM", resource))?;
                (snapshot_state(&info), command.already_satisfied(&info))
            }
        };

        if let Some(outcome) = satisfied {
            let after = before.clone();
            return self
                .record(&target_name, command, before, after, Ok(outcome))
                .await;
        }

        if command.is_destructive() {
            self.gate
                .confirm(&Plan {
                    target: target_name.clone(),
                    operation: command.operation_name().to_string(),
                    resource: resource.to_string(),
                    parameters: command.parameters(),
                    current_state: before.clone(),
                })
                .await?;
        }

        let result = self.execute(session.as_ref(), command).await;

        let after = match observe(session.as_ref(), resource).await {
            Ok(state) => state.unwrap_or_else(|| json!({})),
            Err(e) => {
                warn!(error = %e, "could not read state after operation");
                json!({})
            }
        };
        self.record(&target_name, command, before, after, result)
            .await
    }

    async fn record(
        &self,
        target_name: &str,
        command: &LifecycleCommand,
        before: Value,
        after: Value,
        result: Result<Outcome>,
    ) -> Result<Outcome> {
        let resource = command.resource();
        let status = match &result {
            Ok(outcome) if outcome.kind == OutcomeKind::NoOp => RESULT_NOOP.to_string(),
            Ok(outcome) if outcome.kind == OutcomeKind::Advisory => RESULT_ADVISORY.to_string(),
            Ok(_) => RESULT_OK.to_string(),
            Err(e) => result_error(e),
        };
        info!(
            endpoint = %target_name,
            operation = command.operation_name(),
            resource,
            result = %status,
            "lifecycle command finished"
        );

        let entry = AuditEntry::new(target_name, command.operation_name(), resource)
            .with_parameters(command.parameters())
            .with_before(before)
            .with_after(after)
            .with_result(status.clone());
        match (self.audit.log(entry).await, result) {
            (Ok(()), result) => result,
            // The operation's own failure is the more useful error.
            (Err(e), Err(op_err)) => {
                warn!(error = %e, path = %self.audit.path().display(), "failed to write audit entry");
                Err(op_err)
            }
            (Err(e), Ok(_)) => {
                error!(error = %e, path = %self.audit.path().display(), "failed to write audit entry");
                Err(Error::AuditWrite {
                    operation: command.operation_name().to_string(),
                    resource: resource.to_string(),
                    outcome: status,
                    source: Box::new(e),
                })
            }
        }
    }

    async fn execute(&self, session: &dyn Session, command: &LifecycleCommand) -> Result<Outcome> {
        let ops = VmOps::new(session, &self.waiter);
        match command {
            LifecycleCommand::PowerOn { vm } => ops.power_on(vm).await,
            LifecycleCommand::PowerOff { vm, force } => ops.power_off(vm, *force).await,
            LifecycleCommand::Reset { vm } => ops.reset(vm).await,
            LifecycleCommand::Suspend { vm } => ops.suspend(vm).await,
            LifecycleCommand::CreateVm(spec) => ops.create(spec).await,
            LifecycleCommand::DeleteVm { vm } => ops.delete(vm).await,
            LifecycleCommand::ReconfigureVm { vm, spec } => ops.reconfigure(vm, spec).await,
            LifecycleCommand::CreateSnapshot { vm, spec } => ops.create_snapshot(vm, spec).await,
            LifecycleCommand::RevertSnapshot { vm, snapshot } => {
                ops.revert_snapshot(vm, snapshot).await
            }
            LifecycleCommand::DeleteSnapshot {
                vm,
                snapshot,
                remove_children,
            } => ops.delete_snapshot(vm, snapshot, *remove_children).await,
            LifecycleCommand::CloneVm { vm, new_name } => ops.clone(vm, new_name).await,
            LifecycleCommand::MigrateVm { vm, host } => ops.migrate(vm, host).await,
        }
    }
}
