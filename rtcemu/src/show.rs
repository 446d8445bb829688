//! Reading back what each node is currently shaped to.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::LabError;
use crate::host::preflight;
use crate::naming::NODE_IFACE;
use crate::net;
use crate::Lab;

const PROGRAMS: &[&str] = &["ip", "tc"];

/// Raw qdisc value for a node with no netem discipline.
pub const NO_QDISC: &str = "none";

/// Words that start a new netem option, so never a value of the previous one.
const NETEM_KEYWORDS: &[&str] = &[
    "delay",
    "loss",
    "rate",
    "limit",
    "distribution",
    "duplicate",
    "corrupt",
    "reorder",
    "gap",
    "ecn",
    "slot",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub name: String,
    pub interface: String,
    /// Empty when unset, likewise for the other values.
    pub delay: String,
    pub jitter: String,
    pub loss: String,
    pub bw: String,
    /// The normalized netem line, or [`NO_QDISC`].
    pub raw_qdisc: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShowResult {
    pub bridge: String,
    pub subnet: String,
    pub nodes: Vec<NodeStatus>,
}

/// Values parsed out of a netem line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetemValues {
    pub delay: String,
    pub jitter: String,
    pub loss: String,
    pub bw: String,
}

impl Lab {
    /// Describe every node of the current lab in state order.
    pub async fn show(&self, cancel: &CancellationToken) -> Result<ShowResult, LabError> {
        preflight(self.host(), "show", PROGRAMS)?;
        let state = self.load_state().await?;
        let namespaces = net::list_namespaces(self.exec(), cancel).await?;

        let mut nodes = Vec::with_capacity(state.nodes.len());
        for node in &state.nodes {
            if !namespaces.contains(node) {
                return Err(LabError::NamespaceNotFound(node.clone()));
            }
            nodes.push(self.node_status(cancel, node).await?);
        }

        Ok(ShowResult {
            bridge: state.bridge,
            subnet: state.subnet,
            nodes,
        })
    }

    async fn node_status(
        &self,
        cancel: &CancellationToken,
        node: &str,
    ) -> Result<NodeStatus, LabError> {
        let args = ["netns", "exec", node, "tc", "qdisc", "show", "dev", NODE_IFACE];
        let out = self
            .exec()
            .output(cancel, "ip", &args)
            .await
            .map_err(|source| {
                if source.is_cancelled() {
                    LabError::Cancelled
                } else {
                    LabError::InspectFailed {
                        node: node.to_owned(),
                        source,
                    }
                }
            })?;

        let (raw_qdisc, values) = match extract_netem_line(&out) {
            Some(line) => {
                let values = parse_netem_values(&line);
                (line, values)
            }
            None => (NO_QDISC.to_owned(), NetemValues::default()),
        };

        Ok(NodeStatus {
            name: node.to_owned(),
            interface: NODE_IFACE.to_owned(),
            delay: values.delay,
            jitter: values.jitter,
            loss: values.loss,
            bw: values.bw,
            raw_qdisc,
        })
    }
}

/// First line of `tc qdisc show` output describing a netem discipline, with
/// runs of whitespace collapsed to single spaces.
pub fn extract_netem_line(out: &str) -> Option<String> {
    out.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|line| line == "qdisc netem" || line.starts_with("qdisc netem "))
}

pub fn parse_netem_values(line: &str) -> NetemValues {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let mut values = NetemValues::default();
    let next = |i: usize| fields.get(i).map(|s| s.to_string());

    for (i, field) in fields.iter().enumerate() {
        match *field {
            "delay" => {
                if let Some(delay) = next(i + 1) {
                    values.delay = delay;
                }
                if let Some(jitter) = fields.get(i + 2) {
                    if !NETEM_KEYWORDS.contains(jitter) {
                        values.jitter = jitter.to_string();
                    }
                }
            }
            "loss" => {
                if let Some(loss) = next(i + 1) {
                    values.loss = loss;
                }
            }
            "rate" => {
                if let Some(bw) = next(i + 1) {
                    values.bw = bw;
                }
            }
            _ => {}
        }
    }
    values
}
