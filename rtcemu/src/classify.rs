//! Tell "already gone" apart from "really failed".
//!
//! `ip`, `iptables` and `tc` only report these conditions as free-form text,
//! so each tool gets its own matcher. Teardown paths use them to stay
//! re-runnable; everything else must propagate the error.

use crate::exec::ExecError;

/// Text of a program that ran and failed. A failure to spawn or a
/// cancellation never means "already gone".
fn failure_text(err: &ExecError) -> Option<String> {
    match err {
        ExecError::Failed { diagnostic, .. } => Some(diagnostic.to_lowercase()),
        ExecError::Spawn { .. } | ExecError::Cancelled => None,
    }
}

/// `ip link show|del` on a device that does not exist.
pub fn is_link_not_found(err: &ExecError) -> bool {
    failure_text(err)
        .is_some_and(|msg| msg.contains("does not exist") || msg.contains("cannot find device"))
}

/// `iptables -C|-D` on a rule that is not installed.
pub fn is_rule_not_found(err: &ExecError) -> bool {
    failure_text(err)
        .is_some_and(|msg| msg.contains("bad rule") || msg.contains("no chain/target/match"))
}

/// `ip netns del` on a namespace that does not exist.
pub fn is_namespace_not_found(err: &ExecError) -> bool {
    failure_text(err).is_some_and(|msg| msg.contains("no such file or directory"))
}

/// `tc qdisc del ... root` when only the default qdisc is installed.
pub fn is_qdisc_not_found(err: &ExecError) -> bool {
    failure_text(err).is_some_and(|msg| {
        msg.contains("cannot delete qdisc with handle of zero")
            || msg.contains("no such file or directory")
    })
}
