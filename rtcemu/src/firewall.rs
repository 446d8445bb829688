//! The iptables rules a lab needs, and how to add and remove them safely.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::classify::is_rule_not_found;
use crate::error::LabError;
use crate::exec::{ExecError, Executor};
use crate::state::FirewallRule;

impl FirewallRule {
    /// Build the check/add/delete forms of the rule `spec` in `table`'s `chain`.
    pub fn new(table: Option<&str>, chain: &str, spec: &[&str]) -> Self {
        let form = |op: &str| {
            let mut args = Vec::with_capacity(spec.len() + 4);
            if let Some(table) = table {
                args.extend(["-t".to_owned(), table.to_owned()]);
            }
            args.extend([op.to_owned(), chain.to_owned()]);
            args.extend(spec.iter().map(|s| s.to_string()));
            args
        };

        Self {
            check_args: form("-C"),
            add_args: form("-A"),
            del_args: form("-D"),
        }
    }
}

/// The three rules that give the lab subnet a path to the outside world.
pub fn managed_rules(bridge: &str, subnet: &str) -> Vec<FirewallRule> {
    vec![
        FirewallRule::new(
            Some("nat"),
            "POSTROUTING",
            &["-s", subnet, "!", "-o", bridge, "-j", "MASQUERADE"],
        ),
        FirewallRule::new(None, "FORWARD", &["-i", bridge, "-j", "ACCEPT"]),
        FirewallRule::new(
            None,
            "FORWARD",
            &[
                "-o",
                bridge,
                "-m",
                "conntrack",
                "--ctstate",
                "RELATED,ESTABLISHED",
                "-j",
                "ACCEPT",
            ],
        ),
    ]
}

async fn iptables(
    exec: &dyn Executor,
    cancel: &CancellationToken,
    args: &[String],
) -> Result<(), ExecError> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    exec.run(cancel, "iptables", &args).await
}

/// Whether `rule` is installed at least once.
pub async fn rule_present(
    exec: &dyn Executor,
    cancel: &CancellationToken,
    rule: &FirewallRule,
) -> Result<bool, LabError> {
    match iptables(exec, cancel, &rule.check_args).await {
        Ok(()) => Ok(true),
        Err(err) if is_rule_not_found(&err) => Ok(false),
        Err(err) => Err(LabError::check(
            format!("check iptables rule {:?}", rule.check_args),
            err,
        )),
    }
}

/// Add `rule` unless it is already there. Returns whether it was added.
pub async fn ensure_rule(
    exec: &dyn Executor,
    cancel: &CancellationToken,
    rule: &FirewallRule,
) -> Result<bool, LabError> {
    if rule_present(exec, cancel, rule).await? {
        debug!(rule = ?rule.add_args, "iptables rule already present");
        return Ok(false);
    }
    iptables(exec, cancel, &rule.add_args).await?;
    debug!(rule = ?rule.add_args, "added iptables rule");
    Ok(true)
}

/// Remove every copy of `rule`. Returns how many were deleted.
pub async fn delete_rule_all(
    exec: &dyn Executor,
    cancel: &CancellationToken,
    rule: &FirewallRule,
) -> Result<usize, LabError> {
    let mut deleted = 0;
    while rule_present(exec, cancel, rule).await? {
        match iptables(exec, cancel, &rule.del_args).await {
            Ok(()) => deleted += 1,
            Err(err) if is_rule_not_found(&err) => break,
            Err(err) => {
                return Err(LabError::check(
                    format!("delete iptables rule {:?}", rule.del_args),
                    err,
                ))
            }
        }
    }
    if deleted > 0 {
        debug!(rule = ?rule.del_args, deleted, "removed iptables rule");
    }
    Ok(deleted)
}
