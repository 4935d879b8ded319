// Run a command over the host's SSH session

use std::sync::Arc;

use async_trait::async_trait;

use super::run_blocking;
use crate::executor::ssh::SSH_CONNECTION;
use crate::executor::{Context, SshConnection, Task, TaskMetadata, TaskOutput};
use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::ArmadaError;

/// Execute `command` remotely; needs a prior `SshOpen`
///
/// The payload is a `CommandResult`. A non-zero exit status fails the task
/// with `CommandFailed`.
#[derive(Debug, Clone)]
pub struct RemoteCommand {
    pub command: String,
    pub meta: Option<TaskMetadata>,
}

impl RemoteCommand {
    pub fn new(command: impl Into<String>) -> Self {
        RemoteCommand {
            command: command.into(),
            meta: None,
        }
    }

    pub fn with_metadata(mut self, identifier: impl Into<String>) -> Self {
        self.meta = Some(TaskMetadata::new(identifier));
        self
    }
}

#[async_trait]
impl Task for RemoteCommand {
    fn name(&self) -> &str {
        "RemoteCommand"
    }

    fn metadata(&self) -> Option<&TaskMetadata> {
        self.meta.as_ref()
    }

    async fn run(
        &self,
        ctx: &Context,
        logger: &dyn Logger,
        host: &Arc<Host>,
    ) -> Result<TaskOutput, ArmadaError> {
        let conn = host.connection_as::<SshConnection>(SSH_CONNECTION)?;

        logger.debug(&format!("running: {}", self.command));
        let command = self.command.clone();
        let result = run_blocking(ctx, move || conn.exec(&command)).await?.check()?;

        Ok(TaskOutput::new(result).changed(true))
    }
}
