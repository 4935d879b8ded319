// Open and close the SSH session cached on each host

use std::sync::Arc;

use async_trait::async_trait;

use super::run_blocking;
use crate::executor::ssh::SSH_CONNECTION;
use crate::executor::{Connection, Context, SshConfig, SshConnection, Task, TaskMetadata, TaskOutput};
use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::ArmadaError;

/// Dial the host and cache the session under `"ssh"`
///
/// A still-authenticated cached session is reused.
#[derive(Debug, Clone, Default)]
pub struct SshOpen {
    pub config: SshConfig,
    pub meta: Option<TaskMetadata>,
}

impl SshOpen {
    pub fn new(config: SshConfig) -> Self {
        SshOpen { config, meta: None }
    }
}

#[async_trait]
impl Task for SshOpen {
    fn name(&self) -> &str {
        "SshOpen"
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
        if let Ok(existing) = host.connection_as::<SshConnection>(SSH_CONNECTION) {
            if existing.is_valid() {
                return Ok(TaskOutput::new("connection already open".to_string()));
            }
        }

        logger.debug(&format!("dialing {}", host.ssh_target()));

        let config = self.config.clone();
        let target = host.clone();
        let conn = run_blocking(ctx, move || config.connect(&target)).await?;

        host.set_connection(SSH_CONNECTION, Arc::new(conn));
        Ok(TaskOutput::new("connection opened".to_string()))
    }
}

/// Close and forget the cached SSH session
#[derive(Debug, Clone, Copy, Default)]
pub struct SshClose;

#[async_trait]
impl Task for SshClose {
    fn name(&self) -> &str {
        "SshClose"
    }

    async fn run(
        &self,
        ctx: &Context,
        _logger: &dyn Logger,
        host: &Arc<Host>,
    ) -> Result<TaskOutput, ArmadaError> {
        let conn = host.connection_as::<SshConnection>(SSH_CONNECTION)?;
        host.remove_connection(SSH_CONNECTION);

        run_blocking(ctx, move || conn.close()).await?;
        Ok(TaskOutput::new("connection closed".to_string()))
    }
}
