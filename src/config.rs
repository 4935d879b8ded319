// Run configuration shared by the library and the CLI

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::executor::{ParallelRunner, Runner, SortedRunner, SshConfig};

/// Which scheduling strategy to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunnerKind {
    /// Every host at once
    #[default]
    Parallel,
    /// One host at a time in key order
    Sorted,
}

impl FromStr for RunnerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "parallel" => Ok(RunnerKind::Parallel),
            "sorted" => Ok(RunnerKind::Sorted),
            other => Err(format!(
                "unknown runner '{}' (expected parallel or sorted)",
                other
            )),
        }
    }
}

impl fmt::Display for RunnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerKind::Parallel => write!(f, "parallel"),
            RunnerKind::Sorted => write!(f, "sorted"),
        }
    }
}

/// Configuration for a fleet run
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Scheduling strategy
    pub runner: RunnerKind,
    /// Maximum concurrent hosts for the parallel runner (0 = unbounded)
    pub max_parallel_hosts: usize,
    /// SSH connect timeout
    pub connect_timeout: Duration,
    /// SSH command timeout
    pub command_timeout: Option<Duration>,
    /// SSH user for hosts that do not set one
    pub ssh_user: Option<String>,
    /// SSH private key path
    pub ssh_private_key: Option<PathBuf>,
    /// SSH password for authentication
    pub ssh_password: Option<String>,
    /// Colourise rendered output
    pub color: bool,
}

impl Default for FleetConfig {
    fn default() -> Self {
        FleetConfig {
            runner: RunnerKind::Parallel,
            max_parallel_hosts: 0,
            connect_timeout: Duration::from_secs(30),
            command_timeout: None,
            ssh_user: None,
            ssh_private_key: None,
            ssh_password: None,
            color: true,
        }
    }
}

impl FleetConfig {
    /// Instantiate the configured runner
    pub fn build_runner(&self) -> Arc<dyn Runner> {
        match self.runner {
            RunnerKind::Parallel => {
                Arc::new(ParallelRunner::with_max_concurrency(self.max_parallel_hosts))
            }
            RunnerKind::Sorted => Arc::new(SortedRunner::new()),
        }
    }

    /// SSH settings derived from this configuration
    pub fn ssh_config(&self) -> SshConfig {
        let mut ssh = SshConfig::new().with_connect_timeout(self.connect_timeout);
        if let Some(timeout) = self.command_timeout {
            ssh = ssh.with_command_timeout(timeout);
        }
        if let Some(user) = &self.ssh_user {
            ssh = ssh.with_default_user(user.clone());
        }
        if let Some(key) = &self.ssh_private_key {
            ssh = ssh.with_private_key(key.clone());
        }
        if let Some(password) = &self.ssh_password {
            ssh = ssh.with_password(password.clone());
        }
        ssh
    }
}
