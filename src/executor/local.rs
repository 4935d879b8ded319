// Local command execution without SSH

use std::process::Stdio;

use tokio::process::Command;

use super::CommandResult;
use crate::output::errors::ArmadaError;

/// Runs commands on the controller through `sh -c`
///
/// Dropping an `exec` future kills the child, so racing it against a
/// `Context` stops the process on cancellation.
#[derive(Debug, Clone)]
pub struct LocalShell {
    shell: String,
}

impl LocalShell {
    pub fn new() -> Self {
        LocalShell {
            shell: "sh".to_string(),
        }
    }

    /// Use another POSIX-compatible shell
    pub fn with_shell(shell: impl Into<String>) -> Self {
        LocalShell {
            shell: shell.into(),
        }
    }

    pub async fn exec(&self, cmd: &str) -> Result<CommandResult, ArmadaError> {
        self.exec_with_env(cmd, &[]).await
    }

    /// Run `cmd` with extra environment variables
    pub async fn exec_with_env(
        &self,
        cmd: &str,
        env: &[(String, String)],
    ) -> Result<CommandResult, ArmadaError> {
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(cmd)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ArmadaError::Io {
                message: format!("Failed to execute local command with {}", self.shell),
                path: None,
                source: e,
            })?;

        Ok(CommandResult {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

impl Default for LocalShell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_exec() {
        let shell = LocalShell::new();
        let result = shell.exec("echo 'hello world'").await.unwrap();

        assert!(result.success());
        assert!(result.stdout.contains("hello world"));
    }

    #[tokio::test]
    async fn test_local_exec_failure() {
        let shell = LocalShell::new();
        let result = shell.exec("echo oops >&2; exit 3").await.unwrap();

        assert!(!result.success());
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_exec_with_env() {
        let shell = LocalShell::new();
        let env = vec![("ARMADA_HOST".to_string(), "dev1".to_string())];
        let result = shell.exec_with_env("echo $ARMADA_HOST", &env).await.unwrap();

        assert_eq!(result.stdout.trim(), "dev1");
    }

    #[tokio::test]
    async fn test_missing_shell() {
        let shell = LocalShell::with_shell("/nonexistent/shell");
        assert!(matches!(
            shell.exec("true").await,
            Err(ArmadaError::Io { .. })
        ));
    }
}
