#![cfg(any(test, feature = "test-utils"))]

//! In-memory stand-ins for the host, the process executor and the state store.
//!
//! Every invocation is keyed by its command line (`program arg1 arg2 ...`),
//! which is also what [`FakeExecutor::calls`] records.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::exec::{ExecError, Executor};
use crate::host::Host;
use crate::state::{LabState, StateError, StateStore};

/// iptables' answer to `-C`/`-D` on a rule that is not installed.
pub const BAD_RULE: &str = "iptables: Bad rule (does a matching rule exist in that chain?).";

pub fn call_key(program: &str, args: &[&str]) -> String {
    let mut key = program.to_owned();
    for arg in args {
        key.push(' ');
        key.push_str(arg);
    }
    key.trim().to_owned()
}

/// Scripted [`Executor`].
///
/// Unscripted `run` calls succeed and unscripted `output` calls return an
/// empty string. Exact scripts take precedence over the iptables presence
/// model.
#[derive(Default)]
pub struct FakeExecutor {
    calls: Mutex<Vec<String>>,
    run_results: HashMap<String, Result<(), String>>,
    output_results: HashMap<String, Result<String, String>>,
    rule_presence: Option<usize>,
    rule_checks: Mutex<HashMap<String, usize>>,
    cancel_on: Option<(String, CancellationToken)>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `run` of `key` fail with `diagnostic`.
    pub fn fail_run(mut self, key: &str, diagnostic: &str) -> Self {
        self.run_results
            .insert(key.to_owned(), Err(diagnostic.to_owned()));
        self
    }

    pub fn on_output(mut self, key: &str, stdout: &str) -> Self {
        self.output_results
            .insert(key.to_owned(), Ok(stdout.to_owned()));
        self
    }

    pub fn fail_output(mut self, key: &str, diagnostic: &str) -> Self {
        self.output_results
            .insert(key.to_owned(), Err(diagnostic.to_owned()));
        self
    }

    /// Model every iptables rule as installed `copies` times: each distinct
    /// `-C` command succeeds `copies` times, then reports a bad rule.
    pub fn iptables_rules_installed(mut self, copies: usize) -> Self {
        self.rule_presence = Some(copies);
        self
    }

    /// Cancel `token` right after the command `key` has run.
    pub fn cancel_after(mut self, key: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((key.to_owned(), token));
        self
    }

    /// The same executor preloaded with a healthy host: no bridge, no
    /// namespaces, forwarding off, no firewall rules.
    pub fn clean_host(self) -> Self {
        self.fail_run("ip link show rtcemu0", r#"Device "rtcemu0" does not exist."#)
            .on_output("ip netns list", "")
            .on_output("sysctl -n net.ipv4.ip_forward", "0\n")
            .iptables_rules_installed(0)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn has_call(&self, key: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == key)
    }

    pub fn count_calls(&self, key: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == key).count()
    }

    /// Position of the first call equal to `key`.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.calls.lock().unwrap().iter().position(|c| c == key)
    }

    fn record(&self, cancel: &CancellationToken, key: &str) -> Result<(), ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }
        self.calls.lock().unwrap().push(key.to_owned());
        if let Some((trigger, token)) = &self.cancel_on {
            if trigger == key {
                token.cancel();
            }
        }
        Ok(())
    }

    fn iptables_check(&self, key: &str) -> Option<Result<(), String>> {
        let copies = self.rule_presence?;
        if !key.starts_with("iptables ") {
            return None;
        }
        let args: Vec<&str> = key.split(' ').collect();
        if args.contains(&"-C") {
            let mut checks = self.rule_checks.lock().unwrap();
            let seen = checks.entry(key.to_owned()).or_insert(0);
            *seen += 1;
            return Some(if *seen <= copies {
                Ok(())
            } else {
                Err(BAD_RULE.to_owned())
            });
        }
        None
    }
}

fn split_key(key: &str) -> (&str, Vec<&str>) {
    let mut parts = key.split(' ');
    let program = parts.next().unwrap_or_default();
    (program, parts.collect())
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<(), ExecError> {
        let key = call_key(program, args);
        self.record(cancel, &key)?;

        let result = if let Some(result) = self.run_results.get(&key) {
            result.clone()
        } else if let Some(result) = self.iptables_check(&key) {
            result
        } else {
            Ok(())
        };

        result.map_err(|diagnostic| {
            let (program, args) = split_key(&key);
            ExecError::failed(program, &args, diagnostic)
        })
    }

    async fn output(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<String, ExecError> {
        let key = call_key(program, args);
        self.record(cancel, &key)?;

        let result = self
            .output_results
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Ok(String::new()));

        result.map_err(|diagnostic| {
            let (program, args) = split_key(&key);
            ExecError::failed(program, &args, diagnostic)
        })
    }
}

/// A Linux box with every tool installed and root privileges, unless told otherwise.
#[derive(Debug, Clone)]
pub struct FakeHost {
    pub os: String,
    pub root: bool,
    pub missing: HashSet<String>,
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            os: "linux".to_owned(),
            root: true,
            missing: HashSet::new(),
        }
    }
}

impl FakeHost {
    pub fn without_program(mut self, program: &str) -> Self {
        self.missing.insert(program.to_owned());
        self
    }
}

impl Host for FakeHost {
    fn os(&self) -> &str {
        &self.os
    }

    fn is_root(&self) -> bool {
        self.root
    }

    fn find_program(&self, program: &str) -> Option<PathBuf> {
        (!self.missing.contains(program)).then(|| PathBuf::from("/usr/sbin").join(program))
    }
}

/// State kept in memory, with switchable failures.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: Mutex<Option<LabState>>,
    pub fail_load: Option<String>,
    pub fail_save: Option<String>,
    pub fail_delete: Option<String>,
    deletes: Mutex<usize>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: LabState) -> Self {
        Self {
            state: Mutex::new(Some(state)),
            ..Self::default()
        }
    }

    pub fn current(&self) -> Option<LabState> {
        self.state.lock().unwrap().clone()
    }

    pub fn delete_count(&self) -> usize {
        *self.deletes.lock().unwrap()
    }

    fn io_error(message: &str) -> io::Error {
        io::Error::new(io::ErrorKind::Other, message.to_owned())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self) -> Result<LabState, StateError> {
        if let Some(message) = &self.fail_load {
            return Err(StateError::Read {
                path: PathBuf::from("memory"),
                source: Self::io_error(message),
            });
        }
        self.state.lock().unwrap().clone().ok_or(StateError::NotFound)
    }

    async fn save(&self, state: &LabState) -> Result<(), StateError> {
        if let Some(message) = &self.fail_save {
            return Err(StateError::Write {
                path: PathBuf::from("memory"),
                source: Self::io_error(message),
            });
        }
        *self.state.lock().unwrap() = Some(state.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<(), StateError> {
        if let Some(message) = &self.fail_delete {
            return Err(StateError::Remove {
                path: PathBuf::from("memory"),
                source: Self::io_error(message),
            });
        }
        *self.deletes.lock().unwrap() += 1;
        *self.state.lock().unwrap() = None;
        Ok(())
    }
}
