//! Tearing a lab down, with or without its state record.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::classify::{is_link_not_found, is_namespace_not_found};
use crate::error::LabError;
use crate::firewall::{self, managed_rules};
use crate::host::preflight;
use crate::naming;
use crate::net;
use crate::state::{FirewallRule, LabState};
use crate::Lab;

const PROGRAMS: &[&str] = &["ip", "iptables"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DestroyResult {
    pub bridge_deleted: bool,
    /// Namespaces actually removed by this call.
    pub nodes_deleted: Vec<String>,
    /// No state record was found and leftovers were located by name.
    pub state_missing_fallback: bool,
    pub ip_forward_restored: bool,
    pub ip_forward_restore_value: String,
}

impl Lab {
    /// Remove the current lab.
    ///
    /// With a state record, exactly the recorded resources are removed and the
    /// record is deleted last. Without one, only bridge members that follow
    /// the lab's naming scheme, the bridge itself and the well-known firewall
    /// rules are removed; namespaces and forwarding are left alone.
    ///
    /// Safe to repeat: anything already gone is skipped.
    pub async fn destroy(&self, cancel: &CancellationToken) -> Result<DestroyResult, LabError> {
        preflight(self.host(), "destroy", PROGRAMS)?;

        let result = match self.load_state().await {
            Ok(state) => self.destroy_recorded(cancel, state).await?,
            Err(LabError::StateNotFound) => {
                info!("no lab state found, falling back to name-based cleanup");
                self.destroy_fallback(cancel).await?
            }
            Err(err) => return Err(err),
        };

        info!(
            bridge_deleted = result.bridge_deleted,
            nodes = result.nodes_deleted.len(),
            fallback = result.state_missing_fallback,
            "lab destroyed"
        );
        Ok(result)
    }

    async fn destroy_recorded(
        &self,
        cancel: &CancellationToken,
        state: LabState,
    ) -> Result<DestroyResult, LabError> {
        let exec = self.exec();
        let mut result = DestroyResult::default();

        for node in &state.nodes {
            match exec.run(cancel, "ip", &["netns", "del", node]).await {
                Ok(()) => {
                    debug!(%node, "deleted namespace");
                    result.nodes_deleted.push(node.clone());
                }
                Err(err) if is_namespace_not_found(&err) => {
                    debug!(%node, "namespace already gone");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let bridge = if state.bridge.is_empty() {
            self.config.bridge.as_str()
        } else {
            state.bridge.as_str()
        };
        result.bridge_deleted = self.delete_bridge(cancel, bridge).await?;

        self.delete_rules(cancel, &state.rules).await?;

        if net::restore_ip_forward(exec, cancel, &state.ip_forward_before).await? {
            result.ip_forward_restored = true;
            result.ip_forward_restore_value = state.ip_forward_before.clone();
        }

        self.store.delete().await.map_err(LabError::StateDelete)?;
        Ok(result)
    }

    async fn destroy_fallback(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DestroyResult, LabError> {
        let exec = self.exec();
        let bridge = self.config.bridge.as_str();
        let mut result = DestroyResult {
            state_missing_fallback: true,
            ..Default::default()
        };

        let members = net::bridge_members(exec, cancel, bridge).await?;
        if let Some(members) = &members {
            for member in members {
                if !naming::is_managed_host_peer(member) {
                    debug!(%member, "leaving foreign bridge member alone");
                    continue;
                }
                match exec.run(cancel, "ip", &["link", "del", member]).await {
                    Ok(()) => debug!(%member, "deleted host peer"),
                    Err(err) if is_link_not_found(&err) => {}
                    Err(err) => return Err(err.into()),
                }
            }

            exec.run(cancel, "ip", &["link", "set", bridge, "down"])
                .await?;
            exec.run(cancel, "ip", &["link", "del", bridge]).await?;
            result.bridge_deleted = true;
        }

        self.delete_rules(cancel, &managed_rules(bridge, &self.config.subnet()))
            .await?;

        info!("namespaces and net.ipv4.ip_forward are not touched without lab state");
        Ok(result)
    }

    /// Bring `bridge` down and delete it. Returns false if it did not exist.
    async fn delete_bridge(
        &self,
        cancel: &CancellationToken,
        bridge: &str,
    ) -> Result<bool, LabError> {
        let exec = self.exec();
        if !net::link_exists(exec, cancel, bridge).await? {
            return Ok(false);
        }
        exec.run(cancel, "ip", &["link", "set", bridge, "down"])
            .await?;
        exec.run(cancel, "ip", &["link", "del", bridge]).await?;
        debug!(%bridge, "deleted bridge");
        Ok(true)
    }

    async fn delete_rules(
        &self,
        cancel: &CancellationToken,
        rules: &[FirewallRule],
    ) -> Result<(), LabError> {
        for rule in rules {
            firewall::delete_rule_all(self.exec(), cancel, rule).await?;
        }
        Ok(())
    }
}
