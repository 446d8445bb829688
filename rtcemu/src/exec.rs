//! External program invocation.
//!
//! Everything the lab does to the host goes through [`Executor`]. The
//! orchestration code never spawns a process itself, which is what lets the
//! test doubles in [`crate::test_utils`] drive it deterministically.

use std::fmt;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The program ran and exited unsuccessfully.
    #[error("{} {}: {}", .program, .args.join(" "), display_diagnostic(.diagnostic, .status))]
    Failed {
        program: String,
        args: Vec<String>,
        diagnostic: String,
        status: Option<i32>,
    },
    /// The program could not be started at all.
    #[error("{} {}: {source}", .program, .args.join(" "))]
    Spawn {
        program: String,
        args: Vec<String>,
        #[source]
        source: std::io::Error,
    },
    #[error("operation cancelled")]
    Cancelled,
}

fn display_diagnostic(diagnostic: &str, status: &Option<i32>) -> String {
    match (diagnostic.is_empty(), *status) {
        (true, Some(code)) => format!("exit status {code}"),
        (true, None) => "terminated by signal".to_owned(),
        (false, Some(code)) => format!("{diagnostic} (exit status {code})"),
        (false, None) => diagnostic.to_owned(),
    }
}

impl ExecError {
    /// Build a failure from a program's diagnostic text.
    pub fn failed(program: &str, args: &[&str], diagnostic: impl Into<String>) -> Self {
        Self::Failed {
            program: program.to_owned(),
            args: args.iter().map(|a| a.to_string()).collect(),
            diagnostic: diagnostic.into(),
            status: Some(1),
        }
    }

    /// The text the classifiers in [`crate::classify`] look at.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Failed { diagnostic, .. } => diagnostic.clone(),
            Self::Spawn { source, .. } => source.to_string(),
            Self::Cancelled => String::new(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a program for its side effect.
    async fn run(&self, cancel: &CancellationToken, program: &str, args: &[&str])
        -> Result<(), ExecError>;

    /// Run a program and capture its standard output.
    async fn output(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<String, ExecError>;
}

/// Spawns real processes with `tokio::process`.
///
/// A cancelled token stops new processes from starting. A process that has
/// already been spawned is always awaited to completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl SystemExecutor {
    async fn spawn(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<Output, ExecError> {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        trace!(program, args = %Args(args), "exec");

        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ExecError::Spawn {
                program: program.to_owned(),
                args: args.iter().map(|a| a.to_string()).collect(),
                source,
            })
    }
}

#[async_trait]
impl Executor for SystemExecutor {
    async fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<(), ExecError> {
        let output = self.spawn(cancel, program, args).await?;
        if output.status.success() {
            return Ok(());
        }

        // Tools disagree on which stream carries the complaint, so keep both.
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Err(ExecError::Failed {
            program: program.to_owned(),
            args: args.iter().map(|a| a.to_string()).collect(),
            diagnostic: combined.trim().to_owned(),
            status: output.status.code(),
        })
    }

    async fn output(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<String, ExecError> {
        let output = self.spawn(cancel, program, args).await?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        Err(ExecError::Failed {
            program: program.to_owned(),
            args: args.iter().map(|a| a.to_string()).collect(),
            diagnostic: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            status: output.status.code(),
        })
    }
}

struct Args<'a>(&'a [&'a str]);

impl fmt::Display for Args<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}
