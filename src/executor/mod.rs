// Executor module - task dispatch engine

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::ArmadaError;

pub mod context;
pub mod local;
pub mod parallel;
pub mod result;
pub mod runner;
pub mod sorted;
pub mod ssh;
pub mod wrapper;

pub use context::Context;
pub use local::LocalShell;
pub use parallel::ParallelRunner;
pub use result::{run_subtask, JobResult, Payload, TaskOutput};
pub use runner::Runner;
pub use sorted::SortedRunner;
pub use ssh::{CommandResult, SshConfig, SshConnection};
pub use wrapper::task_wrapper;

/// A live handle cached on a host (SSH session, API client...)
pub trait Connection: Send + Sync {
    fn close(&self) -> Result<(), ArmadaError>;

    /// Used to recover the concrete connection type
    fn as_any(&self) -> &dyn Any;
}

/// Descriptive data about a task, used for rendering only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskMetadata {
    pub identifier: String,
}

impl TaskMetadata {
    pub fn new(identifier: impl Into<String>) -> Self {
        TaskMetadata {
            identifier: identifier.into(),
        }
    }
}

/// A unit of work executed once per selected host
///
/// `run` may be called concurrently for different hosts. Tasks should watch
/// `ctx` (e.g. through `Context::guard`) so cancellation and deadlines take
/// effect promptly.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &str;

    fn metadata(&self) -> Option<&TaskMetadata> {
        None
    }

    /// The metadata identifier if there is one, otherwise `name()`
    fn display_name(&self) -> &str {
        match self.metadata() {
            Some(meta) if !meta.identifier.is_empty() => &meta.identifier,
            _ => self.name(),
        }
    }

    async fn run(
        &self,
        ctx: &Context,
        logger: &dyn Logger,
        host: &Arc<Host>,
    ) -> Result<TaskOutput, ArmadaError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(Option<TaskMetadata>);

    #[async_trait]
    impl Task for Named {
        fn name(&self) -> &str {
            "Named"
        }

        fn metadata(&self) -> Option<&TaskMetadata> {
            self.0.as_ref()
        }

        async fn run(
            &self,
            _ctx: &Context,
            _logger: &dyn Logger,
            _host: &Arc<Host>,
        ) -> Result<TaskOutput, ArmadaError> {
            Ok(TaskOutput::empty())
        }
    }

    #[test]
    fn test_display_name() {
        assert_eq!(Named(None).display_name(), "Named");
        assert_eq!(Named(Some(TaskMetadata::new(""))).display_name(), "Named");
        assert_eq!(
            Named(Some(TaskMetadata::new("gather facts"))).display_name(),
            "gather facts"
        );
    }
}
