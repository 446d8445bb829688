//! Small probes of live kernel networking state shared by the lab operations.

use tokio_util::sync::CancellationToken;

use crate::classify::is_link_not_found;
use crate::error::LabError;
use crate::exec::Executor;

const IP_FORWARD_KEY: &str = "net.ipv4.ip_forward";

/// Whether the link `name` exists. Only a not-found diagnostic means "no".
pub async fn link_exists(
    exec: &dyn Executor,
    cancel: &CancellationToken,
    name: &str,
) -> Result<bool, LabError> {
    match exec.run(cancel, "ip", &["link", "show", name]).await {
        Ok(()) => Ok(true),
        Err(err) if is_link_not_found(&err) => Ok(false),
        Err(err) => Err(LabError::check("check bridge existence", err)),
    }
}

/// Names of all network namespaces, as listed by `ip netns list`.
pub async fn list_namespaces(
    exec: &dyn Executor,
    cancel: &CancellationToken,
) -> Result<Vec<String>, LabError> {
    let out = exec
        .output(cancel, "ip", &["netns", "list"])
        .await
        .map_err(|err| LabError::check("list namespaces", err))?;

    // Lines look like `node1 (id: 0)` once the namespace has an id.
    Ok(out
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_owned)
        .collect())
}

/// Interfaces enslaved to `bridge`, or `None` when the bridge is missing.
pub async fn bridge_members(
    exec: &dyn Executor,
    cancel: &CancellationToken,
    bridge: &str,
) -> Result<Option<Vec<String>>, LabError> {
    if !link_exists(exec, cancel, bridge).await? {
        return Ok(None);
    }

    let out = exec
        .output(cancel, "ip", &["-o", "link", "show", "master", bridge])
        .await
        .map_err(|err| LabError::check(format!("list bridge members for {bridge}"), err))?;

    Ok(Some(parse_link_names(&out)))
}

/// Pull interface names out of `ip -o link show` output.
///
/// `7: br-node1@if8: <BROADCAST> ...` yields `br-node1`.
pub fn parse_link_names(out: &str) -> Vec<String> {
    out.lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(|field| field.trim_end_matches(':'))
        .map(|field| field.split('@').next().unwrap_or(field))
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Current `net.ipv4.ip_forward`, which must be `0` or `1`.
pub async fn read_ip_forward(
    exec: &dyn Executor,
    cancel: &CancellationToken,
) -> Result<String, LabError> {
    let out = exec
        .output(cancel, "sysctl", &["-n", IP_FORWARD_KEY])
        .await
        .map_err(|err| LabError::check(format!("read {IP_FORWARD_KEY}"), err))?;

    let value = out.trim();
    if value != "0" && value != "1" {
        return Err(LabError::InvalidForwardValue(value.to_owned()));
    }
    Ok(value.to_owned())
}

pub async fn write_ip_forward(
    exec: &dyn Executor,
    cancel: &CancellationToken,
    value: &str,
) -> Result<(), LabError> {
    if value != "0" && value != "1" {
        return Err(LabError::InvalidForwardValue(value.to_owned()));
    }
    let setting = format!("{IP_FORWARD_KEY}={value}");
    exec.run(cancel, "sysctl", &["-w", &setting]).await?;
    Ok(())
}

/// Put back a previously captured value. An empty value was never captured
/// and is left alone; returns whether anything was written.
pub async fn restore_ip_forward(
    exec: &dyn Executor,
    cancel: &CancellationToken,
    value: &str,
) -> Result<bool, LabError> {
    if value.is_empty() {
        return Ok(false);
    }
    write_ip_forward(exec, cancel, value).await?;
    Ok(true)
}
