// Error types for Armada

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// An error shared between a host's last-error slot and the results that carry it.
///
/// Identity matters: the error a task returned is the same allocation on the
/// host, on its `JobResult` and on any parent result that surfaces it through
/// `any_err()`, so callers can compare with `Arc::ptr_eq`.
pub type SharedError = Arc<ArmadaError>;

/// All error types in Armada
#[derive(Debug, Error)]
pub enum ArmadaError {
    /// I/O errors
    #[error("{message}: {source}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    /// Inventory could not be built from its source
    #[error("{message}")]
    Inventory {
        message: String,
        suggestion: Option<String>,
    },

    /// Inventory YAML could not be decoded
    #[error("problem unmarshalling yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// No connection cached on the host under that name
    #[error("couldn't find connection '{0}'")]
    ConnectionNotFound(String),

    /// A cached connection has a different concrete type than requested
    #[error("connection '{name}' is not of type {expected}")]
    ConnectionType { name: String, expected: &'static str },

    /// SSH connection errors
    #[error("ssh error on {host}: {message}")]
    Ssh {
        host: String,
        message: String,
        suggestion: Option<String>,
    },

    /// A command ran but exited non-zero
    #[error("command exited with status {exit_code}: {stderr}")]
    CommandFailed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// The run context was cancelled
    #[error("context canceled")]
    Cancelled,

    /// The run context's deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// A task panicked while running against a host
    #[error("task '{task}' panicked on {host}: {message}")]
    TaskPanicked {
        task: String,
        host: String,
        message: String,
    },

    /// A processor failed at one of the hook points
    #[error("problem running processor during '{hook}': {source}")]
    Processor {
        hook: HookPoint,
        #[source]
        source: Box<ArmadaError>,
    },

    /// A stage of an orchestrator run failed
    #[error("{stage}: {source}")]
    Run {
        stage: RunStage,
        #[source]
        source: Box<ArmadaError>,
    },

    /// The receiving side of the result queue went away
    #[error("result queue closed before {host} could report")]
    ResultQueueClosed { host: String },

    /// A runner worker could not be joined
    #[error("runner worker failed: {0}")]
    Worker(String),

    /// Plain task failure
    #[error("{0}")]
    Task(String),

    /// Anything else a task wants to report
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ArmadaError {
    /// Build a plain task failure
    pub fn task(message: impl Into<String>) -> Self {
        ArmadaError::Task(message.into())
    }

    /// Wrap an error with the run stage it happened in
    pub fn at_stage(self, stage: RunStage) -> Self {
        ArmadaError::Run {
            stage,
            source: Box::new(self),
        }
    }

    /// True for errors produced by the run context rather than the task
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ArmadaError::Cancelled | ArmadaError::DeadlineExceeded)
    }
}

/// The four processor hook points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    TaskStarted,
    TaskInstanceStarted,
    TaskInstanceCompleted,
    TaskCompleted,
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPoint::TaskStarted => write!(f, "TaskStarted"),
            HookPoint::TaskInstanceStarted => write!(f, "TaskInstanceStarted"),
            HookPoint::TaskInstanceCompleted => write!(f, "TaskInstanceCompleted"),
            HookPoint::TaskCompleted => write!(f, "TaskCompleted"),
        }
    }
}

/// Orchestrator stages an error can be attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    TaskStarted,
    Dispatch,
    Wait,
    TaskCompleted,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStage::TaskStarted => write!(f, "problem running TaskStarted processors"),
            RunStage::Dispatch => write!(f, "problem calling runner"),
            RunStage::Wait => write!(f, "problem waiting for runner"),
            RunStage::TaskCompleted => write!(f, "problem running TaskCompleted processors"),
        }
    }
}

/// Suggest common fixes for errors
pub fn suggest_fix(error: &ArmadaError) -> Option<String> {
    match error {
        ArmadaError::Ssh {
            message,
            suggestion,
            ..
        } => {
            if suggestion.is_some() {
                suggestion.clone()
            } else if message.contains("refused") {
                Some("Ensure SSH service is running on the target host".to_string())
            } else if message.contains("timed out") || message.contains("timeout") {
                Some("Check network connectivity and firewall rules".to_string())
            } else if message.contains("uthentication") {
                Some("Verify SSH key or password is correct".to_string())
            } else {
                None
            }
        }

        ArmadaError::ConnectionNotFound(name) => Some(format!(
            "Run a task that opens the '{}' connection first (e.g. SshOpen)",
            name
        )),

        ArmadaError::Inventory { suggestion, .. } => suggestion.clone(),

        ArmadaError::Run { source, .. } | ArmadaError::Processor { source, .. } => {
            suggest_fix(source)
        }

        _ => None,
    }
}
