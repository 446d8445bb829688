use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::LabError;

/// Where the lab lives and how it is addressed.
///
/// Every [`crate::Lab`] is built from one of these. The defaults match what
/// earlier releases hard-coded, so a lab created with defaults can be torn down
/// by any later build that also uses defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Name of the shared bridge device.
    pub bridge: String,
    /// Address assigned to the bridge; nodes route through it.
    pub gateway: Ipv4Addr,
    /// Prefix length of the lab subnet.
    pub prefix_len: u8,
    /// Location of the persisted lab state.
    pub state_path: PathBuf,
    /// Address pinged from `node1` to report external reachability.
    pub probe_target: String,
    /// Reply timeout for every reachability probe, in whole seconds.
    pub probe_timeout_secs: u64,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            bridge: "rtcemu0".to_owned(),
            gateway: Ipv4Addr::new(10, 200, 0, 1),
            prefix_len: 24,
            state_path: PathBuf::from("/run/rtc-emulator/lab.json"),
            probe_target: "1.1.1.1".to_owned(),
            probe_timeout_secs: 1,
        }
    }
}

impl LabConfig {
    /// The lab subnet in CIDR form, e.g. `10.200.0.0/24`.
    pub fn subnet(&self) -> String {
        format!("{}/{}", Ipv4Addr::from(self.network()), self.prefix_len)
    }

    fn mask(&self) -> u32 {
        match self.prefix_len {
            0 => 0,
            len => u32::MAX << (32 - u32::from(len.min(32))),
        }
    }

    fn network(&self) -> u32 {
        u32::from(self.gateway) & self.mask()
    }

    /// The bridge address in CIDR form, e.g. `10.200.0.1/24`.
    pub fn gateway_cidr(&self) -> String {
        format!("{}/{}", self.gateway, self.prefix_len)
    }

    /// Address of node `index` (1-based): the subnet base plus `index + 1`.
    pub fn node_ip(&self, index: usize) -> Ipv4Addr {
        Ipv4Addr::from(self.network().wrapping_add(index as u32 + 1))
    }

    /// Check that `nodes` node addresses fit inside the subnet and leave the
    /// gateway alone.
    pub fn check_addressing(&self, nodes: usize) -> Result<(), LabError> {
        if self.prefix_len > 32 {
            return Err(LabError::InvalidAddressing(format!(
                "prefix length {} is longer than 32",
                self.prefix_len
            )));
        }

        let network = u64::from(self.network());
        let broadcast = network | u64::from(!self.mask());
        let gateway = u64::from(u32::from(self.gateway));
        let last = network + nodes as u64 + 1;

        if gateway == network || gateway == broadcast {
            return Err(LabError::InvalidAddressing(format!(
                "gateway {} is not a host address in {}",
                self.gateway,
                self.subnet()
            )));
        }
        if last >= broadcast {
            return Err(LabError::InvalidAddressing(format!(
                "subnet {} has no room for {nodes} nodes",
                self.subnet()
            )));
        }
        if (network + 2..=last).contains(&gateway) {
            return Err(LabError::InvalidAddressing(format!(
                "gateway {} collides with the node range {}-{}",
                self.gateway,
                self.node_ip(1),
                self.node_ip(nodes)
            )));
        }
        Ok(())
    }
}
