//! Two-step confirmation for destructive operations.

use std::sync::Arc;

use dialoguer::console::Term;
use dialoguer::Confirm;
use serde_json::Value;
use tracing::info;

use crate::error::{Error, Result};
use crate::notify::audit::{AuditEntry, AuditLog, RESULT_REJECTED};

/// Interactive yes/no source.
pub trait Prompter: Send + Sync {
    fn confirm(&self, prompt: &str) -> Result<bool>;

    /// Show informational text before prompting.
    fn present(&self, text: &str);
}

/// Terminal prompts on stderr. Defaults to "no".
#[derive(Debug, Default, Clone, Copy)]
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn confirm(&self, prompt: &str) -> Result<bool> {
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact_on(&Term::stderr())
            .map_err(|e| Error::Prompt(e.to_string()))
    }

    fn present(&self, text: &str) {
        eprintln!("{text}");
    }
}

/// What is about to happen, shown to the operator before confirming.
#[derive(Debug, Clone)]
pub struct Plan {
    pub target: String,
    pub operation: String,
    pub resource: String,
    pub parameters: Value,
    /// Observed state of the resource right now.
    pub current_state: Value,
}

impl Plan {
    pub fn render(&self) -> String {
        let mut out = format!(
            "Operation: {}\nTarget:    {}\nResource:  {}\n",
            self.operation, self.target, self.resource
        );
        if let Some(params) = self.parameters.as_object().filter(|p| !p.is_empty()) {
            out.push_str("Parameters:\n");
            for (k, v) in params {
                out.push_str(&format!("  {k}: {v}\n"));
            }
        }
        if let Some(state) = self.current_state.as_object().filter(|s| !s.is_empty()) {
            out.push_str("Current state:\n");
            for (k, v) in state {
                out.push_str(&format!("  {k}: {v}\n"));
            }
        }
        out
    }
}

pub struct ConfirmationGate {
    prompter: Arc<dyn Prompter>,
    audit: Arc<AuditLog>,
}

impl ConfirmationGate {
    pub fn new(prompter: Arc<dyn Prompter>, audit: Arc<AuditLog>) -> Self {
        Self { prompter, audit }
    }

    /// Present `plan` and require two affirmative answers. A decline at
    /// either step is audited as `rejected` and returns [`Error::Rejected`].
    pub async fn confirm(&self, plan: &Plan) -> Result<()> {
        self.prompter.present(&plan.render());

        let first = self.prompter.confirm(&format!(
            "Proceed with {} on '{}' ({})?",
            plan.operation, plan.resource, plan.target
        ))?;
        let approved = first
            && self.prompter.confirm(&format!(
                "Confirm again: {} '{}'. This cannot be undone.",
                plan.operation, plan.resource
            ))?;

        if approved {
            return Ok(());
        }

        info!(operation = %plan.operation, resource = %plan.resource, "operation rejected");
        self.audit
            .log(
                AuditEntry::new(&plan.target, &plan.operation, &plan.resource)
                    .with_parameters(plan.parameters.clone())
                    .with_before(plan.current_state.clone())
                    .with_result(RESULT_REJECTED),
            )
            .await?;
        Err(Error::Rejected {
            operation: plan.operation.clone(),
            resource: plan.resource.clone(),
        })
    }
}
