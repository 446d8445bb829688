//! Per-node impairments via `tc netem`.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::classify::is_qdisc_not_found;
use crate::error::LabError;
use crate::host::preflight;
use crate::naming::NODE_IFACE;
use crate::net;
use crate::state::LabState;
use crate::Lab;

const PROGRAMS: &[&str] = &["ip", "tc"];

/// Impairments to install on one node. Values are passed to `tc` verbatim,
/// e.g. `50ms`, `1%`, `2mbit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpairmentSpec {
    pub node: String,
    pub delay: Option<String>,
    pub jitter: Option<String>,
    pub loss: Option<String>,
    pub bandwidth: Option<String>,
}

impl ImpairmentSpec {
    pub fn new(node: impl Into<String>) -> Self {
        ImpairmentSpec {
            node: node.into(),
            ..Default::default()
        }
    }

    pub fn delay(mut self, delay: impl Into<String>) -> Self {
        self.delay = Some(delay.into());
        self
    }

    pub fn jitter(mut self, jitter: impl Into<String>) -> Self {
        self.jitter = Some(jitter.into());
        self
    }

    pub fn loss(mut self, loss: impl Into<String>) -> Self {
        self.loss = Some(loss.into());
        self
    }

    pub fn bandwidth(mut self, bandwidth: impl Into<String>) -> Self {
        self.bandwidth = Some(bandwidth.into());
        self
    }

    /// Trim the node name and drop blank values.
    fn normalized(&self) -> Self {
        let keep = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };
        ImpairmentSpec {
            node: self.node.trim().to_owned(),
            delay: keep(&self.delay),
            jitter: keep(&self.jitter),
            loss: keep(&self.loss),
            bandwidth: keep(&self.bandwidth),
        }
    }

    fn validate(&self) -> Result<(), LabError> {
        if self.node.is_empty() {
            return Err(LabError::NodeRequired);
        }
        if self.delay.is_none()
            && self.jitter.is_none()
            && self.loss.is_none()
            && self.bandwidth.is_none()
        {
            return Err(LabError::NoImpairment);
        }
        if self.jitter.is_some() && self.delay.is_none() {
            return Err(LabError::JitterWithoutDelay);
        }
        Ok(())
    }

    /// The `netem` argument list, e.g. `delay 50ms 10ms loss 1% rate 2mbit`.
    fn netem_args(&self) -> Vec<&str> {
        let mut args = Vec::new();
        if let Some(delay) = &self.delay {
            args.extend(["delay", delay.as_str()]);
            if let Some(jitter) = &self.jitter {
                args.push(jitter);
            }
        }
        if let Some(loss) = &self.loss {
            args.extend(["loss", loss.as_str()]);
        }
        if let Some(bandwidth) = &self.bandwidth {
            args.extend(["rate", bandwidth.as_str()]);
        }
        args
    }
}

/// What was installed on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyResult {
    pub node: String,
    pub delay: Option<String>,
    pub jitter: Option<String>,
    pub loss: Option<String>,
    pub bw: Option<String>,
}

impl Lab {
    /// Replace whatever discipline `spec.node` had with one built from `spec`.
    ///
    /// Fields left unset are not carried over from an earlier call.
    pub async fn apply(
        &self,
        cancel: &CancellationToken,
        spec: &ImpairmentSpec,
    ) -> Result<ApplyResult, LabError> {
        preflight(self.host(), "apply", PROGRAMS)?;
        let spec = spec.normalized();
        spec.validate()?;

        self.managed_node(cancel, &spec.node).await?;

        let mut args = vec![
            "netns",
            "exec",
            spec.node.as_str(),
            "tc",
            "qdisc",
            "replace",
            "dev",
            NODE_IFACE,
            "root",
            "netem",
        ];
        args.extend(spec.netem_args());

        self.exec()
            .run(cancel, "ip", &args)
            .await
            .map_err(|source| match LabError::from(source) {
                LabError::Command(source) => LabError::ApplyFailed {
                    node: spec.node.clone(),
                    source,
                },
                other => other,
            })?;

        info!(node = %spec.node, netem = %spec.netem_args().join(" "), "impairments applied");
        Ok(ApplyResult {
            node: spec.node,
            delay: spec.delay,
            jitter: spec.jitter,
            loss: spec.loss,
            bw: spec.bandwidth,
        })
    }

    /// Remove the root discipline from `node`. Returns false when there was
    /// nothing to remove.
    pub async fn clear(&self, cancel: &CancellationToken, node: &str) -> Result<bool, LabError> {
        preflight(self.host(), "clear", PROGRAMS)?;
        let node = node.trim();
        if node.is_empty() {
            return Err(LabError::NodeRequired);
        }

        self.managed_node(cancel, node).await?;

        let args = ["netns", "exec", node, "tc", "qdisc", "del", "dev", NODE_IFACE, "root"];
        match self.exec().run(cancel, "ip", &args).await {
            Ok(()) => {
                info!(%node, "impairments cleared");
                Ok(true)
            }
            Err(err) if is_qdisc_not_found(&err) => {
                debug!(%node, "no impairments to clear");
                Ok(false)
            }
            Err(err) if err.is_cancelled() => Err(LabError::Cancelled),
            Err(source) => Err(LabError::ClearFailed {
                node: node.to_owned(),
                source,
            }),
        }
    }

    /// Check that `node` belongs to the current lab and its namespace is live.
    async fn managed_node(
        &self,
        cancel: &CancellationToken,
        node: &str,
    ) -> Result<LabState, LabError> {
        let state = self.load_state().await?;
        if !state.nodes.iter().any(|n| n == node) {
            return Err(LabError::NodeNotManaged(node.to_owned()));
        }

        let namespaces = net::list_namespaces(self.exec(), cancel).await?;
        if !namespaces.iter().any(|ns| ns == node) {
            return Err(LabError::NamespaceNotFound(node.to_owned()));
        }
        Ok(state)
    }
}
