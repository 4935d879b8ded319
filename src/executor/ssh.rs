// SSH sessions cached on hosts

use std::fmt;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use ssh2::{KeyboardInteractivePrompt, Session};

use super::Connection;
use crate::inventory::Host;
use crate::output::errors::ArmadaError;

/// Name SSH connections are cached under on a host
pub const SSH_CONNECTION: &str = "ssh";

/// Host data key that points at a private key file for that host
pub const PRIVATE_KEY_DATA_KEY: &str = "ssh_private_key_file";

/// How to dial and authenticate SSH sessions
///
/// Host attributes win over these settings: a host's username, password and
/// `ssh_private_key_file` data entry are used when present.
#[derive(Clone)]
pub struct SshConfig {
    pub connect_timeout: Duration,
    pub command_timeout: Option<Duration>,
    pub default_user: Option<String>,
    pub private_key_path: Option<PathBuf>,
    pub password: Option<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        SshConfig {
            connect_timeout: Duration::from_secs(30),
            command_timeout: None,
            default_user: None,
            private_key_path: None,
            password: None,
        }
    }
}

impl fmt::Debug for SshConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConfig")
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .field("default_user", &self.default_user)
            .field("private_key_path", &self.private_key_path)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl SshConfig {
    pub fn new() -> Self {
        SshConfig::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn with_default_user(mut self, user: impl Into<String>) -> Self {
        self.default_user = Some(user.into());
        self
    }

    pub fn with_private_key(mut self, path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(path.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    fn user_for(&self, host: &Host) -> String {
        if host.username.is_empty() {
            self.default_user
                .clone()
                .or_else(|| std::env::var("USER").ok())
                .unwrap_or_else(|| "root".to_string())
        } else {
            host.username.clone()
        }
    }

    /// Key files to try, most specific first
    fn key_paths_for(&self, host: &Host) -> Vec<PathBuf> {
        let from_host = host
            .get_data(PRIVATE_KEY_DATA_KEY)
            .and_then(|v| v.as_str())
            .map(PathBuf::from);

        from_host
            .into_iter()
            .chain(self.private_key_path.clone())
            .chain(
                [".ssh/id_ed25519", ".ssh/id_rsa"]
                    .into_iter()
                    .filter_map(|p| dirs::home_dir().map(|h| h.join(p))),
            )
            .collect()
    }

    /// Dial and authenticate a blocking SSH session to `host`
    pub fn connect(&self, host: &Host) -> Result<SshConnection, ArmadaError> {
        let ssh_err = |message: String, suggestion: Option<String>| ArmadaError::Ssh {
            host: host.hostname.clone(),
            message,
            suggestion,
        };

        let address = (host.hostname.as_str(), host.port)
            .to_socket_addrs()
            .map_err(|e| {
                ssh_err(
                    format!("Invalid address: {}", e),
                    Some("Check the host address format".to_string()),
                )
            })?
            .next()
            .ok_or_else(|| ssh_err("Address resolved to nothing".to_string(), None))?;

        let tcp = TcpStream::connect_timeout(&address, self.connect_timeout).map_err(|e| {
            ssh_err(
                format!("Connection failed: {}", e),
                ssh_connection_suggestion(&e),
            )
        })?;

        let mut session = Session::new()
            .map_err(|e| ssh_err(format!("Failed to create SSH session: {}", e), None))?;

        session.set_tcp_stream(tcp);
        session.set_timeout(millis(self.connect_timeout));

        session.handshake().map_err(|e| {
            ssh_err(
                format!("SSH handshake failed: {}", e),
                Some("Check SSH service is running on the target".to_string()),
            )
        })?;

        let user = self.user_for(host);
        if !self.authenticate(&session, host, &user) {
            return Err(ssh_err(
                "Authentication failed".to_string(),
                Some(
                    "Ensure SSH key is added to agent, specify --private-key, or use --ask-pass for password auth"
                        .to_string(),
                ),
            ));
        }

        session.set_timeout(self.command_timeout.map(millis).unwrap_or(0));

        Ok(SshConnection {
            session: Arc::new(Mutex::new(session)),
            host_name: host.hostname.clone(),
        })
    }

    // Agent, then key files, then password and keyboard-interactive
    fn authenticate(&self, session: &Session, host: &Host, user: &str) -> bool {
        if let Ok(mut agent) = session.agent() {
            if agent.connect().is_ok() {
                agent.list_identities().ok();
                for identity in agent.identities().unwrap_or_default() {
                    if agent.userauth(user, &identity).is_ok() {
                        return true;
                    }
                }
            }
        }

        for key_path in self.key_paths_for(host) {
            if key_path.exists()
                && session
                    .userauth_pubkey_file(user, None, &key_path, None)
                    .is_ok()
            {
                return true;
            }
        }

        let password = if host.password.is_empty() {
            self.password.clone()
        } else {
            Some(host.password.clone())
        };

        if let Some(password) = password {
            if session.userauth_password(user, &password).is_ok() {
                return true;
            }

            // Some PAM setups only accept keyboard-interactive
            let mut prompter = PasswordPrompter(password);
            if session
                .userauth_keyboard_interactive(user, &mut prompter)
                .is_ok()
            {
                return true;
            }
        }

        session.authenticated()
    }
}

/// An authenticated SSH session
///
/// Clones share the session; channel operations are serialised.
#[derive(Clone)]
pub struct SshConnection {
    session: Arc<Mutex<Session>>,
    host_name: String,
}

impl fmt::Debug for SshConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshConnection")
            .field("host_name", &self.host_name)
            .finish_non_exhaustive()
    }
}

impl SshConnection {
    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn is_valid(&self) -> bool {
        self.session.lock().authenticated()
    }

    fn ssh_err(&self, message: String) -> ArmadaError {
        ArmadaError::Ssh {
            host: self.host_name.clone(),
            message,
            suggestion: None,
        }
    }

    /// Run a command and collect its output (blocking)
    pub fn exec(&self, command: &str) -> Result<CommandResult, ArmadaError> {
        let session = self.session.lock();

        let mut channel = session
            .channel_session()
            .map_err(|e| self.ssh_err(format!("Failed to open channel: {}", e)))?;

        channel.exec(command).map_err(|e| {
            let timed_out = e.to_string().contains("timeout");
            self.ssh_err(format!(
                "Failed to execute command{}: {}",
                if timed_out { " (timeout)" } else { "" },
                e
            ))
        })?;

        let stdout = read_output(&mut channel)
            .map_err(|e| self.ssh_err(format!("Failed to read stdout: {}", e)))?;
        let stderr = read_output(&mut channel.stderr())
            .map_err(|e| self.ssh_err(format!("Failed to read stderr: {}", e)))?;

        channel.wait_close().ok();
        let exit_code = channel.exit_status().unwrap_or(-1);

        Ok(CommandResult {
            stdout,
            stderr,
            exit_code,
        })
    }

    /// Copy a local file to `remote_path` over SFTP, returning the byte count (blocking)
    pub fn upload_file(&self, local_path: &Path, remote_path: &str) -> Result<u64, ArmadaError> {
        let content = std::fs::read(local_path).map_err(|e| ArmadaError::Io {
            message: "Failed to read local file".to_string(),
            path: Some(local_path.to_path_buf()),
            source: e,
        })?;

        let session = self.session.lock();
        let sftp = session
            .sftp()
            .map_err(|e| self.ssh_err(format!("Failed to open SFTP: {}", e)))?;

        let mut remote_file = sftp
            .create(Path::new(remote_path))
            .map_err(|e| self.ssh_err(format!("Failed to create remote file: {}", e)))?;

        remote_file
            .write_all(&content)
            .map_err(|e| self.ssh_err(format!("Failed to write remote file: {}", e)))?;

        Ok(content.len() as u64)
    }
}

impl Connection for SshConnection {
    fn close(&self) -> Result<(), ArmadaError> {
        self.session
            .lock()
            .disconnect(None, "closed by armada", None)
            .map_err(|e| self.ssh_err(format!("Failed to disconnect: {}", e)))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Drain a stream, replacing invalid UTF-8 instead of dropping the output
fn read_output<R: Read>(reader: &mut R) -> std::io::Result<String> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Result of executing a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into `CommandFailed`
    pub fn check(self) -> Result<CommandResult, ArmadaError> {
        if self.success() {
            return Ok(self);
        }
        Err(ArmadaError::CommandFailed {
            exit_code: self.exit_code,
            stderr: self.stderr.trim_end().to_string(),
            stdout: self.stdout,
        })
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, " * stdout: {}", self.stdout.trim_end())?;
        writeln!(f, " * stderr: {}", self.stderr.trim_end())?;
        write!(f, " * exit_code: {}", self.exit_code)
    }
}

fn millis(d: Duration) -> u32 {
    u32::try_from(d.as_millis()).unwrap_or(u32::MAX)
}

fn ssh_connection_suggestion(e: &std::io::Error) -> Option<String> {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Some("Ensure SSH service is running on the target host".to_string())
        }
        std::io::ErrorKind::TimedOut => {
            Some("Check network connectivity and firewall rules".to_string())
        }
        std::io::ErrorKind::PermissionDenied => {
            Some("Check SSH key permissions and authentication".to_string())
        }
        _ => None,
    }
}

/// Answers every keyboard-interactive prompt with the password
struct PasswordPrompter(String);

impl KeyboardInteractivePrompt for PasswordPrompter {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.0.clone()).collect()
    }
}
