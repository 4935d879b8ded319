// Run a command on the controller, once per host

use std::sync::Arc;

use async_trait::async_trait;

use crate::executor::{Context, LocalShell, Task, TaskMetadata, TaskOutput};
use crate::inventory::Host;
use crate::logging::Logger;
use crate::output::errors::ArmadaError;

/// Execute `command` locally through `sh -c` (or the shell set with `with_shell`)
///
/// The host is exposed to the command as `ARMADA_HOST`, `ARMADA_PORT`,
/// `ARMADA_USER` and `ARMADA_PLATFORM`. Cancellation kills the process.
#[derive(Debug, Clone)]
pub struct LocalCommand {
    pub command: String,
    pub shell: LocalShell,
    pub meta: Option<TaskMetadata>,
}

impl LocalCommand {
    pub fn new(command: impl Into<String>) -> Self {
        LocalCommand {
            command: command.into(),
            shell: LocalShell::new(),
            meta: None,
        }
    }

    /// Run through `shell -c` instead of `sh -c`
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = LocalShell::with_shell(shell);
        self
    }

    pub fn with_metadata(mut self, identifier: impl Into<String>) -> Self {
        self.meta = Some(TaskMetadata::new(identifier));
        self
    }
}

fn host_env(host: &Host) -> Vec<(String, String)> {
    vec![
        ("ARMADA_HOST".to_string(), host.hostname.clone()),
        ("ARMADA_PORT".to_string(), host.port.to_string()),
        ("ARMADA_USER".to_string(), host.username.clone()),
        ("ARMADA_PLATFORM".to_string(), host.platform.clone()),
    ]
}

#[async_trait]
impl Task for LocalCommand {
    fn name(&self) -> &str {
        "LocalCommand"
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
        logger.debug(&format!("running locally: {}", self.command));

        let env = host_env(host);
        let result = ctx
            .guard(self.shell.exec_with_env(&self.command, &env))
            .await?
            .check()?;

        Ok(TaskOutput::new(result).changed(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{CommandResult, JobResult};
    use crate::logging::NullLogger;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_local_command_sees_host() {
        let host = Arc::new(Host::new("dev7").with_port(2200));
        let output = LocalCommand::new("echo $ARMADA_HOST:$ARMADA_PORT")
            .run(&Context::background(), &NullLogger, &host)
            .await
            .unwrap();

        let result = JobResult::from_outcome(host, Ok(output));
        assert!(result.changed());
        let command = result.data_as::<CommandResult>().unwrap();
        assert_eq!(command.stdout.trim(), "dev7:2200");
    }

    #[tokio::test]
    async fn test_local_command_failure() {
        let host = Arc::new(Host::new("dev1"));
        let err = LocalCommand::new("exit 4")
            .run(&Context::background(), &NullLogger, &host)
            .await
            .unwrap_err();

        assert!(matches!(err, ArmadaError::CommandFailed { exit_code: 4, .. }));
    }

    #[tokio::test]
    async fn test_local_command_custom_shell() {
        let host = Arc::new(Host::new("dev1"));
        let err = LocalCommand::new("true")
            .with_shell("/nonexistent/shell")
            .run(&Context::background(), &NullLogger, &host)
            .await
            .unwrap_err();

        assert!(matches!(err, ArmadaError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/shell"));
    }

    #[tokio::test]
    async fn test_local_command_cancelled() {
        let host = Arc::new(Host::new("dev1"));
        let ctx = Context::background().with_timeout(Duration::from_millis(50));

        let start = Instant::now();
        let err = LocalCommand::new("sleep 5")
            .run(&ctx, &NullLogger, &host)
            .await
            .unwrap_err();

        assert!(matches!(err, ArmadaError::DeadlineExceeded));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
