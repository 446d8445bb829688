//! Provisioning a new lab.
//!
//! Every kernel object is created through a step that, once it succeeds,
//! pushes its undo onto a [`RollbackStack`]. Any failure unwinds the stack so
//! the host ends up as it was before the call.

use std::net::Ipv4Addr;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::LabError;
use crate::firewall::{self, managed_rules};
use crate::host::preflight;
use crate::naming::{self, MAX_NODES, NODE_IFACE};
use crate::net;
use crate::rollback::{Compensation, RollbackStack};
use crate::state::LabState;
use crate::Lab;

const PROGRAMS: &[&str] = &["ip", "sysctl", "iptables", "ping"];

/// A provisioned node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub name: String,
    pub ip: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateResult {
    pub bridge: String,
    pub nodes: Vec<Node>,
    /// Whether `node1` could reach the configured probe target.
    pub internet_reachable: bool,
}

impl Lab {
    /// Build a lab of `nodes` namespaces behind a fresh bridge.
    ///
    /// Fails with [`LabError::LabExists`] if any trace of a previous lab is
    /// found. On any later failure, or if `cancel` fires, everything created so
    /// far is removed again before the error is returned.
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        nodes: usize,
    ) -> Result<CreateResult, LabError> {
        if !(1..=MAX_NODES).contains(&nodes) {
            return Err(LabError::InvalidNodeCount {
                got: nodes,
                max: MAX_NODES,
            });
        }
        self.config.check_addressing(nodes)?;
        preflight(self.host(), "create", PROGRAMS)?;
        self.ensure_no_lab(cancel).await?;

        let mut rollback = RollbackStack::new();
        match self.provision(cancel, nodes, &mut rollback).await {
            Ok(result) => {
                rollback.commit();
                info!(
                    bridge = %result.bridge,
                    nodes = result.nodes.len(),
                    internet = result.internet_reachable,
                    "lab created"
                );
                Ok(result)
            }
            Err(err) => {
                warn!(error = %err, steps = rollback.len(), "create failed, rolling back");
                Err(rollback.abort(self.exec(), err).await)
            }
        }
    }

    async fn ensure_no_lab(&self, cancel: &CancellationToken) -> Result<(), LabError> {
        match self.store.load().await {
            Ok(_) => {
                return Err(LabError::LabExists {
                    reason: "state file exists".to_owned(),
                })
            }
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(LabError::StateCheck(err)),
        }

        let bridge = &self.config.bridge;
        if net::link_exists(self.exec(), cancel, bridge).await? {
            return Err(LabError::LabExists {
                reason: format!("bridge {bridge} already exists"),
            });
        }

        let namespaces = net::list_namespaces(self.exec(), cancel).await?;
        if let Some(ns) = namespaces
            .iter()
            .find(|ns| naming::is_managed_node_name(ns))
        {
            debug!(namespace = %ns, "found leftover node namespace");
            return Err(LabError::LabExists {
                reason: "node namespace already exists".to_owned(),
            });
        }

        Ok(())
    }

    async fn provision(
        &self,
        cancel: &CancellationToken,
        nodes: usize,
        rollback: &mut RollbackStack,
    ) -> Result<CreateResult, LabError> {
        let exec = self.exec();
        let bridge = self.config.bridge.as_str();
        let gateway_cidr = self.config.gateway_cidr();

        exec.run(cancel, "ip", &["link", "add", bridge, "type", "bridge"])
            .await?;
        rollback.push(Compensation::DeleteBridge {
            bridge: bridge.to_owned(),
        });
        exec.run(cancel, "ip", &["addr", "add", &gateway_cidr, "dev", bridge])
            .await?;
        exec.run(cancel, "ip", &["link", "set", bridge, "up"])
            .await?;
        debug!(%bridge, gateway = %gateway_cidr, "bridge up");

        let ip_forward_before = net::read_ip_forward(exec, cancel).await?;
        net::write_ip_forward(exec, cancel, "1").await?;
        rollback.push(Compensation::RestoreForwarding {
            value: ip_forward_before.clone(),
        });

        // Rules that were already installed belong to someone else.
        let subnet = self.config.subnet();
        let mut rules = Vec::new();
        for rule in managed_rules(bridge, &subnet) {
            if firewall::ensure_rule(exec, cancel, &rule).await? {
                rollback.push(Compensation::DeleteRule(rule.clone()));
                rules.push(rule);
            }
        }

        let mut created = Vec::with_capacity(nodes);
        for index in 1..=nodes {
            created.push(self.provision_node(cancel, index, rollback).await?);
        }

        let internet_reachable = self.probe_internet(cancel).await?;

        if cancel.is_cancelled() {
            return Err(LabError::Cancelled);
        }
        let state = LabState {
            bridge: bridge.to_owned(),
            subnet,
            nodes: created.iter().map(|node| node.name.clone()).collect(),
            rules,
            ip_forward_before,
        };
        self.store
            .save(&state)
            .await
            .map_err(LabError::StatePersist)?;

        Ok(CreateResult {
            bridge: bridge.to_owned(),
            nodes: created,
            internet_reachable,
        })
    }

    async fn provision_node(
        &self,
        cancel: &CancellationToken,
        index: usize,
        rollback: &mut RollbackStack,
    ) -> Result<Node, LabError> {
        let exec = self.exec();
        let bridge = self.config.bridge.as_str();
        let name = naming::node_name(index);
        let ip = self.config.node_ip(index);
        let host_peer = naming::host_peer_name(&name);
        let ns_peer = naming::ns_peer_name(&name);
        let node_cidr = format!("{ip}/{}", self.config.prefix_len);
        let gateway = self.config.gateway.to_string();
        let timeout = self.config.probe_timeout_secs.to_string();

        exec.run(cancel, "ip", &["netns", "add", &name]).await?;
        rollback.push(Compensation::DeleteNamespace { name: name.clone() });

        exec.run(
            cancel,
            "ip",
            &["link", "add", &ns_peer, "type", "veth", "peer", "name", &host_peer],
        )
        .await?;
        rollback.push(Compensation::DeleteLink {
            name: host_peer.clone(),
        });

        exec.run(cancel, "ip", &["link", "set", &ns_peer, "netns", &name])
            .await?;
        exec.run(cancel, "ip", &["link", "set", &host_peer, "master", bridge])
            .await?;
        exec.run(cancel, "ip", &["link", "set", &host_peer, "up"])
            .await?;

        let in_ns: [&[&str]; 5] = [
            &["ip", "link", "set", "lo", "up"],
            &["ip", "link", "set", &ns_peer, "name", NODE_IFACE],
            &["ip", "addr", "add", &node_cidr, "dev", NODE_IFACE],
            &["ip", "link", "set", NODE_IFACE, "up"],
            &["ip", "route", "add", "default", "via", &gateway],
        ];
        for command in in_ns {
            let mut args = vec!["netns", "exec", name.as_str()];
            args.extend_from_slice(command);
            exec.run(cancel, "ip", &args).await?;
        }

        let ping = [
            "netns", "exec", &name, "ping", "-c", "1", "-W", &timeout, &gateway,
        ];
        if let Err(source) = exec.run(cancel, "ip", &ping).await {
            if source.is_cancelled() {
                return Err(LabError::Cancelled);
            }
            return Err(LabError::Connectivity {
                node: name,
                target: gateway,
                source,
            });
        }

        debug!(node = %name, %ip, "node ready");
        Ok(Node { name, ip })
    }

    /// Ping the probe target from `node1`. Only cancellation is an error.
    async fn probe_internet(&self, cancel: &CancellationToken) -> Result<bool, LabError> {
        let target = self.config.probe_target.as_str();
        let timeout = self.config.probe_timeout_secs.to_string();
        let node = naming::node_name(1);
        let args = ["netns", "exec", &node, "ping", "-c", "1", "-W", &timeout, target];

        match self.exec().run(cancel, "ip", &args).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_cancelled() => Err(LabError::Cancelled),
            Err(err) => {
                warn!(%target, error = %err, "internet probe failed");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::LabConfig;
    use crate::state::StateStore;
    use crate::test_utils::{FakeExecutor, FakeHost, MemoryStateStore, BAD_RULE};

    const INTERNET_PROBE: &str = "ip netns exec node1 ping -c 1 -W 1 1.1.1.1";

    type Fixture = (Lab, Arc<FakeExecutor>, Arc<MemoryStateStore>);

    fn lab_with_config(
        config: LabConfig,
        exec: FakeExecutor,
        host: FakeHost,
        store: MemoryStateStore,
    ) -> Fixture {
        let exec = Arc::new(exec);
        let store = Arc::new(store);
        let lab = Lab::new(config, exec.clone(), Arc::new(host), store.clone());
        (lab, exec, store)
    }

    fn lab(exec: FakeExecutor, host: FakeHost, store: MemoryStateStore) -> Fixture {
        lab_with_config(LabConfig::default(), exec, host, store)
    }

    fn existing_state() -> LabState {
        LabState {
            bridge: "rtcemu0".into(),
            subnet: "10.200.0.0/24".into(),
            nodes: vec!["node1".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_node_counts() {
        for nodes in [0, MAX_NODES + 1] {
            let (lab, exec, _) =
                lab(FakeExecutor::new(), FakeHost::default(), MemoryStateStore::new());
            let err = lab.create(&CancellationToken::new(), nodes).await.unwrap_err();
            assert!(err.to_string().contains("between 1 and 250"), "{err}");
            assert!(exec.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_rejects_gateway_inside_node_range() {
        let config = LabConfig {
            gateway: Ipv4Addr::new(10, 200, 0, 3),
            ..LabConfig::default()
        };
        let (lab, exec, store) = lab_with_config(
            config,
            FakeExecutor::new().clean_host(),
            FakeHost::default(),
            MemoryStateStore::new(),
        );

        let err = lab.create(&CancellationToken::new(), 2).await.unwrap_err();
        assert!(matches!(err, LabError::InvalidAddressing(_)), "{err}");
        assert!(exec.calls().is_empty());
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_nodes_are_addressed_from_subnet_base() {
        let config = LabConfig {
            gateway: Ipv4Addr::new(10, 200, 0, 129),
            prefix_len: 25,
            ..LabConfig::default()
        };
        let (lab, exec, _) = lab_with_config(
            config,
            FakeExecutor::new().clean_host(),
            FakeHost::default(),
            MemoryStateStore::new(),
        );

        let result = lab.create(&CancellationToken::new(), 1).await.unwrap();
        assert_eq!(result.nodes[0].ip, Ipv4Addr::new(10, 200, 0, 130));
        assert!(exec.has_call("ip netns exec node1 ip addr add 10.200.0.130/25 dev eth0"));
        assert!(exec.has_call("ip netns exec node1 ip route add default via 10.200.0.129"));
    }

    #[tokio::test]
    async fn test_requires_linux() {
        let host = FakeHost {
            os: "macos".into(),
            ..FakeHost::default()
        };
        let (lab, exec, _) = lab(FakeExecutor::new(), host, MemoryStateStore::new());

        let err = lab.create(&CancellationToken::new(), 1).await.unwrap_err();
        assert!(err.to_string().contains("only on linux"), "{err}");
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_requires_ping() {
        let (lab, _, _) = lab(
            FakeExecutor::new().clean_host(),
            FakeHost::default().without_program("ping"),
            MemoryStateStore::new(),
        );

        let err = lab.create(&CancellationToken::new(), 1).await.unwrap_err();
        assert!(matches!(err, LabError::MissingProgram { program } if program == "ping"));
    }

    #[tokio::test]
    async fn test_existing_state_is_a_conflict() {
        let (lab, exec, _) = lab(
            FakeExecutor::new().clean_host(),
            FakeHost::default(),
            MemoryStateStore::with_state(existing_state()),
        );

        let err = lab.create(&CancellationToken::new(), 1).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(err.to_string().contains("state file exists"));
        assert!(exec.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_state_is_not_a_conflict() {
        let mut store = MemoryStateStore::new();
        store.fail_load = Some("permission denied".into());
        let (lab, _, _) = lab(FakeExecutor::new().clean_host(), FakeHost::default(), store);

        let err = lab.create(&CancellationToken::new(), 1).await.unwrap_err();
        assert!(!err.is_conflict());
        assert!(err.to_string().contains("failed to check lab state"), "{err}");
    }

    #[tokio::test]
    async fn test_existing_bridge_fails() {
        let exec = FakeExecutor::new().on_output("ip netns list", "");
        let (lab, exec, _) = lab(exec, FakeHost::default(), MemoryStateStore::new());

        let err = lab.create(&CancellationToken::new(), 1).await.unwrap_err();
        assert!(err.to_string().contains("existing lab detected"), "{err}");
        assert!(err.to_string().contains("bridge rtcemu0 already exists"));
        assert!(!exec.has_call("ip link add rtcemu0 type bridge"));
    }

    #[tokio::test]
    async fn test_bridge_check_error() {
        let exec = FakeExecutor::new().fail_run("ip link show rtcemu0", "operation not permitted");
        let (lab, exec, _) = lab(exec, FakeHost::default(), MemoryStateStore::new());

        let err = lab.create(&CancellationToken::new(), 1).await.unwrap_err();
        assert!(err.to_string().contains("failed to check bridge existence"), "{err}");
        assert!(!exec.has_call("ip link add rtcemu0 type bridge"));
    }

    #[tokio::test]
    async fn test_foreign_namespaces_are_ignored() {
        let exec = FakeExecutor::new()
            .clean_host()
            .on_output("ip netns list", "node-exporter\nnode01\ncni-1234 (id: 3)\n")
            .fail_run(INTERNET_PROBE, "100% packet loss");
        let (lab, _, _) = lab(exec, FakeHost::default(), MemoryStateStore::new());

        lab.create(&CancellationToken::new(), 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_managed_namespace_is_a_conflict() {
        let exec = FakeExecutor::new()
            .clean_host()
            .on_output("ip netns list", "node-exporter\nnode1 (id: 0)\n");
        let (lab, exec, _) = lab(exec, FakeHost::default(), MemoryStateStore::new());

        let err = lab.create(&CancellationToken::new(), 1).await.unwrap_err();
        assert!(err.to_string().contains("node namespace already exists"), "{err}");
        assert!(!exec.has_call("ip link add rtcemu0 type bridge"));
    }

    #[tokio::test]
    async fn test_namespace_listing_error() {
        let exec = FakeExecutor::new()
            .clean_host()
            .fail_output("ip netns list", "permission denied");
        let (lab, _, _) = lab(exec, FakeHost::default(), MemoryStateStore::new());

        let err = lab.create(&CancellationToken::new(), 1).await.unwrap_err();
        assert!(err.to_string().contains("failed to list namespaces"), "{err}");
    }

    #[tokio::test]
    async fn test_success_builds_nodes_and_persists_state() {
        let exec = FakeExecutor::new()
            .clean_host()
            .fail_run(INTERNET_PROBE, "100% packet loss");
        let (lab, exec, store) = lab(exec, FakeHost::default(), MemoryStateStore::new());

        let result = lab.create(&CancellationToken::new(), 2).await.unwrap();

        assert_eq!(result.bridge, "rtcemu0");
        assert_eq!(
            result.nodes,
            vec![
                Node {
                    name: "node1".into(),
                    ip: Ipv4Addr::new(10, 200, 0, 2),
                },
                Node {
                    name: "node2".into(),
                    ip: Ipv4Addr::new(10, 200, 0, 3),
                },
            ]
        );
        assert!(!result.internet_reachable);

        for call in [
            "ip link add rtcemu0 type bridge",
            "ip addr add 10.200.0.1/24 dev rtcemu0",
            "ip link set rtcemu0 up",
            "sysctl -w net.ipv4.ip_forward=1",
            "iptables -t nat -A POSTROUTING -s 10.200.0.0/24 ! -o rtcemu0 -j MASQUERADE",
            "iptables -A FORWARD -i rtcemu0 -j ACCEPT",
            "iptables -A FORWARD -o rtcemu0 -m conntrack --ctstate RELATED,ESTABLISHED -j ACCEPT",
            "ip netns add node2",
            "ip link add veth-node2 type veth peer name br-node2",
            "ip link set veth-node2 netns node2",
            "ip link set br-node2 master rtcemu0",
            "ip netns exec node2 ip link set veth-node2 name eth0",
            "ip netns exec node2 ip addr add 10.200.0.3/24 dev eth0",
            "ip netns exec node2 ip route add default via 10.200.0.1",
            "ip netns exec node2 ping -c 1 -W 1 10.200.0.1",
        ] {
            assert!(exec.has_call(call), "missing call {call:?}");
        }
        assert!(
            exec.position("ip netns exec node1 ping -c 1 -W 1 10.200.0.1")
                < exec.position("ip netns add node2")
        );
        assert!(!exec.has_call("ip link del rtcemu0"));

        let state = store.current().unwrap();
        assert_eq!(state.bridge, "rtcemu0");
        assert_eq!(state.subnet, "10.200.0.0/24");
        assert_eq!(state.nodes, vec!["node1", "node2"]);
        assert_eq!(state.rules.len(), 3);
        assert_eq!(state.ip_forward_before, "0");
    }

    #[tokio::test]
    async fn test_internet_probe_success_is_reported() {
        let (lab, _, _) = lab(
            FakeExecutor::new().clean_host(),
            FakeHost::default(),
            MemoryStateStore::new(),
        );

        let result = lab.create(&CancellationToken::new(), 1).await.unwrap();
        assert!(result.internet_reachable);
    }

    #[tokio::test]
    async fn test_preinstalled_rules_are_left_alone_on_rollback() {
        let exec = FakeExecutor::new()
            .clean_host()
            .iptables_rules_installed(1)
            .fail_run("ip netns add node1", "File exists");
        let (lab, exec, _) = lab(exec, FakeHost::default(), MemoryStateStore::new());

        lab.create(&CancellationToken::new(), 1).await.unwrap_err();
        assert!(!exec.calls().iter().any(|c| c.starts_with("iptables -A")));
        assert!(!exec.calls().iter().any(|c| c.starts_with("iptables -D")));
        assert!(!exec.calls().iter().any(|c| c.starts_with("iptables -t nat -D")));
        assert!(exec.has_call("ip link del rtcemu0"));
    }

    #[tokio::test]
    async fn test_preinstalled_rules_survive_destroy() {
        let exec = FakeExecutor::new().clean_host().iptables_rules_installed(1);
        let (lab, exec, store) = lab(exec, FakeHost::default(), MemoryStateStore::new());

        lab.create(&CancellationToken::new(), 1).await.unwrap();
        assert!(store.current().unwrap().rules.is_empty());
        assert!(!exec.calls().iter().any(|c| c.starts_with("iptables -A")));

        lab.destroy(&CancellationToken::new()).await.unwrap();
        assert!(exec.has_call("ip netns del node1"));
        assert!(!exec.calls().iter().any(|c| c.starts_with("iptables -D")));
        assert!(!exec.calls().iter().any(|c| c.starts_with("iptables -t nat -D")));
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_rollback_on_node_connectivity_failure() {
        let exec = FakeExecutor::new()
            .clean_host()
            .fail_run("ip netns exec node1 ping -c 1 -W 1 10.200.0.1", "100% packet loss");
        let (lab, exec, store) = lab(exec, FakeHost::default(), MemoryStateStore::new());

        let err = lab.create(&CancellationToken::new(), 1).await.unwrap_err();
        assert!(
            err.to_string()
                .contains("connectivity check failed for node1 -> 10.200.0.1"),
            "{err}"
        );

        for call in [
            "ip link del br-node1",
            "ip netns del node1",
            "iptables -D FORWARD -o rtcemu0 -m conntrack --ctstate RELATED,ESTABLISHED -j ACCEPT",
            "iptables -D FORWARD -i rtcemu0 -j ACCEPT",
            "iptables -t nat -D POSTROUTING -s 10.200.0.0/24 ! -o rtcemu0 -j MASQUERADE",
            "sysctl -w net.ipv4.ip_forward=0",
            "ip link del rtcemu0",
        ] {
            assert!(exec.has_call(call), "missing rollback call {call:?}");
        }
        assert!(exec.position("ip netns del node1") < exec.position("ip link del rtcemu0"));
        assert!(
            exec.position("sysctl -w net.ipv4.ip_forward=0") < exec.position("ip link del rtcemu0")
        );
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_iptables_check_error_rolls_back() {
        let exec = FakeExecutor::new()
            .clean_host()
            .fail_run(
                "iptables -C FORWARD -i rtcemu0 -j ACCEPT",
                "iptables v1.8.7 (nf_tables): \
                 Could not fetch rule set generation id: Permission denied",
            );
        let (lab, exec, _) = lab(exec, FakeHost::default(), MemoryStateStore::new());

        let err = lab.create(&CancellationToken::new(), 1).await.unwrap_err();
        assert!(err.to_string().contains("failed to check iptables rule"), "{err}");
        assert!(!exec.has_call("iptables -A FORWARD -i rtcemu0 -j ACCEPT"));
        assert!(!exec.has_call("ip netns add node1"));
        assert!(exec.has_call(
            "iptables -t nat -D POSTROUTING -s 10.200.0.0/24 ! -o rtcemu0 -j MASQUERADE"
        ));
        assert!(exec.has_call("ip link del rtcemu0"));
    }

    #[tokio::test]
    async fn test_persist_failure_rolls_back() {
        let mut store = MemoryStateStore::new();
        store.fail_save = Some("read-only file system".into());
        let (lab, exec, store) = lab(FakeExecutor::new().clean_host(), FakeHost::default(), store);

        let err = lab.create(&CancellationToken::new(), 1).await.unwrap_err();
        assert!(err.to_string().contains("failed to persist lab state"), "{err}");
        assert!(exec.has_call("ip netns del node1"));
        assert!(exec.has_call("ip link del rtcemu0"));
        assert!(matches!(store.load().await, Err(e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn test_cancellation_rolls_back() {
        let cancel = CancellationToken::new();
        let exec = FakeExecutor::new()
            .clean_host()
            .cancel_after("ip netns add node1", cancel.clone());
        let (lab, exec, store) = lab(exec, FakeHost::default(), MemoryStateStore::new());

        let err = lab.create(&cancel, 2).await.unwrap_err();
        assert!(matches!(err, LabError::Cancelled), "{err}");
        assert!(!exec.has_call("ip link add veth-node1 type veth peer name br-node1"));
        assert!(exec.has_call("ip netns del node1"));
        assert!(exec.has_call("sysctl -w net.ipv4.ip_forward=0"));
        assert!(exec.has_call("ip link del rtcemu0"));
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_failed_rollback_is_reported() {
        let exec = FakeExecutor::new()
            .clean_host()
            .fail_run(
                "ip netns exec node1 ip link set lo up",
                "RTNETLINK answers: Operation not permitted",
            )
            .fail_run("ip netns del node1", "Device or resource busy");
        let (lab, exec, _) = lab(exec, FakeHost::default(), MemoryStateStore::new());

        let err = lab.create(&CancellationToken::new(), 1).await.unwrap_err();
        assert!(matches!(err, LabError::RollbackIncomplete { .. }), "{err}");
        assert!(err.root_cause().to_string().contains("Operation not permitted"));
        assert!(exec.has_call("ip link del rtcemu0"));
    }

    #[tokio::test]
    async fn test_rule_check_bad_rule_means_absent() {
        let exec = FakeExecutor::new()
            .clean_host()
            .fail_run("iptables -C FORWARD -i rtcemu0 -j ACCEPT", BAD_RULE);
        let (lab, exec, _) = lab(exec, FakeHost::default(), MemoryStateStore::new());

        lab.create(&CancellationToken::new(), 1).await.unwrap();
        assert!(exec.has_call("iptables -A FORWARD -i rtcemu0 -j ACCEPT"));
    }
}
