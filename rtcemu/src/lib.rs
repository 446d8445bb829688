//! Ephemeral multi-node network labs for testing real-time media under
//! impaired network conditions.
//!
//! A lab is one Linux bridge plus a network namespace per node, each wired to
//! the bridge with a veth pair. Impairments are `tc netem` disciplines on the
//! node side of that pair. Everything is done by driving `ip`, `tc`,
//! `iptables` and `sysctl` through an [`Executor`].

use std::sync::Arc;

pub mod apply;
pub mod classify;
pub mod config;
pub mod create;
pub mod destroy;
pub mod error;
pub mod exec;
pub mod firewall;
pub mod host;
pub mod naming;
pub mod net;
pub mod rollback;
pub mod show;
pub mod state;
pub mod test_utils;

pub use apply::{ApplyResult, ImpairmentSpec};
pub use config::LabConfig;
pub use create::{CreateResult, Node};
pub use destroy::DestroyResult;
pub use error::LabError;
pub use exec::{ExecError, Executor, SystemExecutor};
pub use host::{Host, SystemHost};
pub use show::{NodeStatus, ShowResult};
pub use state::{FileStateStore, FirewallRule, LabState, StateError, StateStore};

pub use tokio_util::sync::CancellationToken;

/// Handle to the lab on this host.
///
/// Holds no kernel state of its own: every operation re-reads the state store
/// and the live system, so handles are cheap and can be rebuilt at will.
#[derive(Clone)]
pub struct Lab {
    config: LabConfig,
    exec: Arc<dyn Executor>,
    host: Arc<dyn Host>,
    store: Arc<dyn StateStore>,
}

impl Lab {
    pub fn new(
        config: LabConfig,
        exec: Arc<dyn Executor>,
        host: Arc<dyn Host>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        Lab {
            config,
            exec,
            host,
            store,
        }
    }

    /// A lab backed by real processes and a state file at `config.state_path`.
    pub fn system(config: LabConfig) -> Self {
        let store = FileStateStore::new(config.state_path.clone());
        Lab::new(
            config,
            Arc::new(SystemExecutor),
            Arc::new(SystemHost),
            Arc::new(store),
        )
    }

    pub fn config(&self) -> &LabConfig {
        &self.config
    }

    fn exec(&self) -> &dyn Executor {
        self.exec.as_ref()
    }

    fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    /// Load the state of an existing lab, keeping "no lab" distinct.
    async fn load_state(&self) -> Result<LabState, LabError> {
        self.store.load().await.map_err(|err| {
            if err.is_not_found() {
                LabError::StateNotFound
            } else {
                LabError::StateLoad(err)
            }
        })
    }
}

impl std::fmt::Debug for Lab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lab").field("config", &self.config).finish()
    }
}
