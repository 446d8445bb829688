//! Compensating actions for a partially built lab.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classify::{is_link_not_found, is_namespace_not_found, is_rule_not_found};
use crate::error::LabError;
use crate::exec::Executor;
use crate::net;
use crate::state::FirewallRule;

/// Undo for one provisioning step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    DeleteBridge { bridge: String },
    RestoreForwarding { value: String },
    DeleteRule(FirewallRule),
    DeleteNamespace { name: String },
    /// Delete a veth pair through its host-side end.
    DeleteLink { name: String },
}

impl Compensation {
    async fn apply(&self, exec: &dyn Executor, cancel: &CancellationToken) -> Result<(), LabError> {
        match self {
            Self::DeleteBridge { bridge } => {
                match exec.run(cancel, "ip", &["link", "del", bridge]).await {
                    Err(err) if !is_link_not_found(&err) => Err(err.into()),
                    _ => Ok(()),
                }
            }
            Self::RestoreForwarding { value } => {
                net::restore_ip_forward(exec, cancel, value).await.map(|_| ())
            }
            Self::DeleteRule(rule) => {
                let args: Vec<&str> = rule.del_args.iter().map(String::as_str).collect();
                match exec.run(cancel, "iptables", &args).await {
                    Err(err) if !is_rule_not_found(&err) => Err(err.into()),
                    _ => Ok(()),
                }
            }
            Self::DeleteNamespace { name } => {
                match exec.run(cancel, "ip", &["netns", "del", name]).await {
                    Err(err) if !is_namespace_not_found(&err) => Err(err.into()),
                    _ => Ok(()),
                }
            }
            Self::DeleteLink { name } => {
                match exec.run(cancel, "ip", &["link", "del", name]).await {
                    Err(err) if !is_link_not_found(&err) => Err(err.into()),
                    _ => Ok(()),
                }
            }
        }
    }
}

/// Compensations in the order their steps succeeded.
#[derive(Debug, Default)]
pub struct RollbackStack {
    steps: Vec<Compensation>,
}

impl RollbackStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: Compensation) {
        self.steps.push(step);
    }

    pub(crate) fn len(&self) -> usize {
        self.steps.len()
    }

    /// Forget every compensation; the provisioned resources are now owned by
    /// the persisted state.
    pub fn commit(mut self) {
        self.steps.clear();
    }

    /// Run every compensation, newest first.
    ///
    /// Each step is attempted even if an earlier one failed. Uses its own
    /// token so a cancelled operation still gets cleaned up. Returns one
    /// message per failed step.
    pub async fn unwind(self, exec: &dyn Executor) -> Vec<String> {
        let cancel = CancellationToken::new();
        let mut failures = Vec::new();

        for step in self.steps.into_iter().rev() {
            match step.apply(exec, &cancel).await {
                Ok(()) => debug!(?step, "rolled back"),
                Err(err) => {
                    warn!(?step, error = %err, "rollback step failed");
                    failures.push(format!("{step:?}: {err}"));
                }
            }
        }

        failures
    }

    /// Unwind and fold any compensation failures into `cause`.
    pub async fn abort(self, exec: &dyn Executor, cause: LabError) -> LabError {
        let failures = self.unwind(exec).await;
        if failures.is_empty() {
            cause
        } else {
            LabError::RollbackIncomplete {
                source: Box::new(cause),
                failures,
            }
        }
    }
}
