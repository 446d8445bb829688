use crate::exec::ExecError;
use crate::state::StateError;

#[derive(Debug, thiserror::Error)]
pub enum LabError {
    #[error("lab {operation} is supported only on linux: got {os}")]
    UnsupportedPlatform { operation: &'static str, os: String },

    #[error("lab {operation} requires root privileges")]
    NotRoot { operation: &'static str },

    #[error("required command \"{program}\" not found")]
    MissingProgram { program: String },

    #[error("nodes must be between 1 and {max}: got {got}")]
    InvalidNodeCount { got: usize, max: usize },

    #[error("invalid lab addressing: {0}")]
    InvalidAddressing(String),

    #[error("node is required")]
    NodeRequired,

    #[error("at least one impairment flag is required (--delay/--loss/--jitter/--bw)")]
    NoImpairment,

    #[error("jitter requires delay")]
    JitterWithoutDelay,

    #[error("existing lab detected ({reason}): run `rtcemuctl lab destroy` and retry")]
    LabExists { reason: String },

    #[error("lab state not found: run `rtcemuctl lab create` first")]
    StateNotFound,

    #[error("failed to check lab state: {0}")]
    StateCheck(#[source] StateError),

    #[error("failed to load lab state: {0}")]
    StateLoad(#[source] StateError),

    #[error("failed to persist lab state: {0}")]
    StatePersist(#[source] StateError),

    #[error("failed to remove lab state: {0}")]
    StateDelete(#[source] StateError),

    #[error("node \"{0}\" is not managed by current lab")]
    NodeNotManaged(String),

    #[error("node \"{0}\" namespace not found")]
    NamespaceNotFound(String),

    /// Probing for a resource failed for a reason other than its absence.
    #[error("failed to {what}: {source}")]
    CheckFailed {
        what: String,
        #[source]
        source: ExecError,
    },

    #[error("connectivity check failed for {node} -> {target}: {source}")]
    Connectivity {
        node: String,
        target: String,
        #[source]
        source: ExecError,
    },

    #[error("failed to apply impairments to {node}: {source}")]
    ApplyFailed {
        node: String,
        #[source]
        source: ExecError,
    },

    #[error("failed to clear impairments on {node}: {source}")]
    ClearFailed {
        node: String,
        #[source]
        source: ExecError,
    },

    #[error("failed to inspect qdisc for {node}: {source}")]
    InspectFailed {
        node: String,
        #[source]
        source: ExecError,
    },

    #[error("unexpected net.ipv4.ip_forward value: {0:?}")]
    InvalidForwardValue(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Command(ExecError),

    /// Create failed and some compensating steps failed as well.
    #[error("{source}; rollback incomplete: {}", .failures.join("; "))]
    RollbackIncomplete {
        #[source]
        source: Box<LabError>,
        failures: Vec<String>,
    },
}

impl From<ExecError> for LabError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Cancelled => Self::Cancelled,
            other => Self::Command(other),
        }
    }
}

impl LabError {
    pub(crate) fn check(what: impl Into<String>, source: ExecError) -> Self {
        match source {
            ExecError::Cancelled => Self::Cancelled,
            source => Self::CheckFailed {
                what: what.into(),
                source,
            },
        }
    }

    /// True for errors that mean "run destroy first".
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::LabExists { .. })
    }

    /// The error behind any rollback report.
    pub fn root_cause(&self) -> &LabError {
        match self {
            Self::RollbackIncomplete { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
