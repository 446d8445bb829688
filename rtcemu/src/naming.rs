//! Names the lab gives to kernel objects.
//!
//! These must never change: the stateless teardown path finds leftovers from
//! earlier runs purely by matching these names.

/// Prefix of every managed namespace.
pub const NODE_PREFIX: &str = "node";
/// Prefix of the host-side veth end attached to the bridge.
pub const HOST_PEER_PREFIX: &str = "br-";
/// Prefix of the namespace-side veth end before it is renamed.
pub const NS_PEER_PREFIX: &str = "veth-";
/// Name of the namespace-side interface once configured.
pub const NODE_IFACE: &str = "eth0";

/// Largest lab the addressing scheme supports.
pub const MAX_NODES: usize = 250;

/// `node<index>`, with `index` starting at 1.
pub fn node_name(index: usize) -> String {
    format!("{NODE_PREFIX}{index}")
}

pub fn host_peer_name(node: &str) -> String {
    format!("{HOST_PEER_PREFIX}{node}")
}

pub fn ns_peer_name(node: &str) -> String {
    format!("{NS_PEER_PREFIX}{node}")
}

/// `node` followed by a positive integer without leading zeros.
pub fn is_managed_node_name(name: &str) -> bool {
    let Some(digits) = name.strip_prefix(NODE_PREFIX) else {
        return false;
    };
    let mut chars = digits.chars();
    match chars.next() {
        Some('1'..='9') => chars.all(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// A bridge member this tool created: `br-` followed by a managed node name.
pub fn is_managed_host_peer(name: &str) -> bool {
    name.strip_prefix(HOST_PEER_PREFIX)
        .is_some_and(is_managed_node_name)
}
