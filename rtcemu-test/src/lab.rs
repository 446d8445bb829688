//! Isolated labs for privileged integration tests.

use std::{
    fs,
    io,
    net::Ipv4Addr,
    ops::Deref,
    path::PathBuf,
    process::{Command, Stdio},
};

use rtcemu::{
    firewall::managed_rules, naming, CancellationToken, CreateResult, Host, Lab, LabConfig,
    LabError, LabState, SystemHost,
};
use tempfile::TempDir;
use tracing::debug;

/// Programs every lab operation needs between them.
pub const REQUIRED_PROGRAMS: &[&str] = &["ip", "tc", "iptables", "sysctl", "ping"];

/// Never collides with the default `rtcemu0` lab.
pub const TEST_BRIDGE: &str = "rtcemutest0";
pub const TEST_GATEWAY: Ipv4Addr = Ipv4Addr::new(10, 231, 0, 1);

/// Upper bound on copies of one rule removed on drop.
const MAX_RULE_COPIES: usize = 16;

/// Reason why privileged tests must be skipped.
#[derive(Debug, thiserror::Error)]
pub enum SkipReason {
    #[error("requires linux")]
    NotLinux,
    #[error("requires root")]
    NotRoot,
    #[error("{0} not found in PATH")]
    MissingProgram(String),
    #[error("a lab already exists on this host ({0})")]
    LabPresent(String),
}

/// Check everything a privileged lab test needs.
pub fn check_privileges() -> Result<(), SkipReason> {
    let host = SystemHost;
    if host.os() != "linux" {
        return Err(SkipReason::NotLinux);
    }
    if !host.is_root() {
        return Err(SkipReason::NotRoot);
    }
    for program in REQUIRED_PROGRAMS {
        if host.find_program(program).is_none() {
            return Err(SkipReason::MissingProgram(program.to_string()));
        }
    }

    // Node namespace names are global, so a real lab would collide.
    let out = Command::new("ip")
        .args(["netns", "list"])
        .stderr(Stdio::null())
        .output()
        .map_err(|_| SkipReason::MissingProgram("ip".to_owned()))?;
    if let Some(ns) = String::from_utf8_lossy(&out.stdout)
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .find(|ns| naming::is_managed_node_name(ns))
    {
        return Err(SkipReason::LabPresent(ns.to_owned()));
    }

    Ok(())
}

/// Returns true (and says why) when the calling test should return early.
pub fn skip_without_privileges() -> bool {
    match check_privileges() {
        Ok(()) => false,
        Err(reason) => {
            eprintln!("SKIPPED: {reason}");
            true
        }
    }
}

/// Config for a lab that can't touch the default one.
pub fn isolated_config(state_dir: &std::path::Path) -> LabConfig {
    LabConfig {
        bridge: TEST_BRIDGE.to_owned(),
        gateway: TEST_GATEWAY,
        state_path: state_dir.join("lab.json"),
        ..LabConfig::default()
    }
}

/// A [`Lab`] whose kernel objects are removed on drop.
///
/// Derefs to [`Lab`], so every operation is available directly.
pub struct TestLab {
    lab: Lab,
    cancel: CancellationToken,
    max_nodes: usize,
    ip_forward_before: Option<String>,
    state_dir: TempDir,
}

impl std::fmt::Debug for TestLab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestLab")
            .field("bridge", &self.lab.config().bridge)
            .field("state_dir", &self.state_dir.path())
            .finish()
    }
}

impl TestLab {
    pub fn new() -> io::Result<Self> {
        let state_dir = tempfile::tempdir()?;
        let lab = Lab::system(isolated_config(state_dir.path()));

        Ok(Self {
            lab,
            cancel: CancellationToken::new(),
            max_nodes: 0,
            ip_forward_before: None,
            state_dir,
        })
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn state_path(&self) -> PathBuf {
        self.lab.config().state_path.clone()
    }

    /// Create the lab and remember how many namespaces drop must remove.
    pub async fn create(&mut self, nodes: usize) -> Result<CreateResult, LabError> {
        self.max_nodes = self.max_nodes.max(nodes);
        if self.ip_forward_before.is_none() {
            self.ip_forward_before = read_ip_forward();
        }
        self.lab.create(&self.cancel, nodes).await
    }

    /// Drop the state record, as if it had been lost.
    pub fn forget_state(&self) -> io::Result<()> {
        fs::remove_file(self.state_path())
    }

    /// The state record as currently persisted, if any.
    pub fn recorded_state(&self) -> Option<LabState> {
        let raw = fs::read(self.state_path()).ok()?;
        serde_json::from_slice(&raw).ok()
    }
}

fn read_ip_forward() -> Option<String> {
    let out = Command::new("sysctl")
        .args(["-n", "net.ipv4.ip_forward"])
        .stderr(Stdio::null())
        .output()
        .ok()?;
    let value = String::from_utf8_lossy(&out.stdout).trim().to_owned();
    (value == "0" || value == "1").then_some(value)
}

impl Deref for TestLab {
    type Target = Lab;

    fn deref(&self) -> &Lab {
        &self.lab
    }
}

fn quiet(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

impl Drop for TestLab {
    fn drop(&mut self) {
        let config = self.lab.config();

        for index in 1..=self.max_nodes {
            let node = naming::node_name(index);
            let _ = quiet("ip", &["netns", "del", &node]);
            let _ = quiet("ip", &["link", "del", &naming::host_peer_name(&node)]);
        }
        let _ = quiet("ip", &["link", "del", &config.bridge]);

        for rule in managed_rules(&config.bridge, &config.subnet()) {
            let args: Vec<&str> = rule.del_args.iter().map(String::as_str).collect();
            for _ in 0..MAX_RULE_COPIES {
                if !quiet("iptables", &args) {
                    break;
                }
            }
        }

        // Covers labs whose state record is already gone
        if let Some(value) = &self.ip_forward_before {
            let setting = format!("net.ipv4.ip_forward={value}");
            let _ = quiet("sysctl", &["-w", &setting]);
        }

        debug!(bridge = %config.bridge, "test lab cleaned up");
    }
}
