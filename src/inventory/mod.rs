// Inventory module for host management

pub mod filter;
mod static_inv;

pub use filter::FilterFunc;
pub use static_inv::*;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_yaml::Value;

use crate::executor::Connection;
use crate::output::errors::{ArmadaError, SharedError};

/// Default SSH port used when the inventory does not set one
pub const DEFAULT_PORT: u16 = 22;

/// A single host in the inventory
///
/// Connection attributes are plain fields. The last error and the cached
/// connections are private and only change while a task runs against the
/// host. They sit behind mutexes, but the engine still assumes a single
/// in-flight run per host: two overlapping runs over the same hosts will
/// overwrite each other's last error and connections.
pub struct Host {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub platform: String,
    pub data: HashMap<String, Value>,
    err: Mutex<Option<SharedError>>,
    connections: Mutex<HashMap<String, Arc<dyn Connection>>>,
}

impl Host {
    pub fn new(hostname: impl Into<String>) -> Self {
        Host {
            hostname: hostname.into(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            platform: String::new(),
            data: HashMap::new(),
            err: Mutex::new(None),
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get the SSH connection string (user@host:port)
    pub fn ssh_target(&self) -> String {
        if self.username.is_empty() {
            format!("{}:{}", self.hostname, self.port)
        } else {
            format!("{}@{}:{}", self.username, self.hostname, self.port)
        }
    }

    /// Error left by the last task that ran against this host
    pub fn err(&self) -> Option<SharedError> {
        self.err.lock().clone()
    }

    pub(crate) fn set_err(&self, err: Option<SharedError>) {
        *self.err.lock() = err;
    }

    /// Cache a connection under `name`, replacing any previous one
    pub fn set_connection(&self, name: impl Into<String>, conn: Arc<dyn Connection>) {
        self.connections.lock().insert(name.into(), conn);
    }

    /// Fetch a connection previously cached under `name`
    pub fn get_connection(&self, name: &str) -> Result<Arc<dyn Connection>, ArmadaError> {
        self.connections
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| ArmadaError::ConnectionNotFound(name.to_string()))
    }

    /// Fetch a cached connection as its concrete type
    pub fn connection_as<T>(&self, name: &str) -> Result<T, ArmadaError>
    where
        T: Connection + Clone + 'static,
    {
        let conn = self.get_connection(name)?;
        conn.as_any()
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ArmadaError::ConnectionType {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Forget a cached connection without closing it
    pub fn remove_connection(&self, name: &str) -> Option<Arc<dyn Connection>> {
        self.connections.lock().remove(name)
    }

    /// Names of the connections currently cached
    pub fn connection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Close and drop every cached connection, returning the first close error
    pub fn close_connections(&self) -> Result<(), ArmadaError> {
        let drained: Vec<_> = self.connections.lock().drain().collect();

        let mut first_err = None;
        for (_, conn) in drained {
            if let Err(e) = conn.close() {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("platform", &self.platform)
            .field("data", &self.data)
            .field("err", &self.err())
            .field("connections", &self.connection_names())
            .finish()
    }
}

/// The complete inventory, keyed by host name
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    pub hosts: HashMap<String, Arc<Host>>,
}

impl Inventory {
    pub fn new() -> Self {
        Inventory::default()
    }

    /// Create inventory from a comma-separated host list
    ///
    /// Example: "server1.example.com,server2.example.com,192.168.1.10"
    pub fn from_host_list(hosts_str: &str, default_user: Option<&str>) -> Self {
        let mut inv = Inventory::new();

        for name in hosts_str.split(',').map(str::trim) {
            if name.is_empty() {
                continue;
            }

            let mut host = Host::new(name);
            if let Some(user) = default_user {
                host = host.with_username(user);
            }

            inv.add_host(name, host);
        }

        inv
    }

    /// Add a host under `key`, returning the shared handle
    pub fn add_host(&mut self, key: impl Into<String>, host: Host) -> Arc<Host> {
        let host = Arc::new(host);
        self.hosts.insert(key.into(), host.clone());
        host
    }

    /// Get a single host by key
    pub fn get_host(&self, key: &str) -> Option<&Arc<Host>> {
        self.hosts.get(key)
    }

    /// Get the total number of hosts
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Host keys in ascending lexicographic order
    pub fn sorted_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.hosts.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Derive a new inventory holding only the hosts `f` accepts
    ///
    /// The filtered inventory shares the same `Host` handles as `self`.
    pub fn filter(&self, f: &FilterFunc) -> Inventory {
        let hosts = self
            .hosts
            .iter()
            .filter(|(_, host)| f(host))
            .map(|(key, host)| (key.clone(), host.clone()))
            .collect();

        Inventory { hosts }
    }
}

impl Inventory {
    /// Derive a new inventory holding only the listed keys
    ///
    /// Unknown keys are ignored. Like `filter`, host handles are shared.
    pub fn select_keys<S: AsRef<str>>(&self, keys: &[S]) -> Inventory {
        let hosts = keys
            .iter()
            .filter_map(|key| {
                let key = key.as_ref();
                self.hosts.get(key).map(|host| (key.to_string(), host.clone()))
            })
            .collect();

        Inventory { hosts }
    }
}

impl FromIterator<(String, Host)> for Inventory {
    fn from_iter<I: IntoIterator<Item = (String, Host)>>(iter: I) -> Self {
        let mut inv = Inventory::new();
        for (key, host) in iter {
            inv.add_host(key, host);
        }
        inv
    }
}

/// A source able to produce a populated inventory
pub trait InventoryPlugin {
    fn create(&self) -> Result<Inventory, ArmadaError>;
}

/// Inventory plugin over a comma-separated host list
#[derive(Debug, Clone)]
pub struct FromHostList {
    pub hosts: String,
    pub default_user: Option<String>,
}

impl InventoryPlugin for FromHostList {
    fn create(&self) -> Result<Inventory, ArmadaError> {
        let inv = Inventory::from_host_list(&self.hosts, self.default_user.as_deref());
        if inv.is_empty() {
            return Err(ArmadaError::Inventory {
                message: "host list is empty".to_string(),
                suggestion: Some("Pass at least one host, e.g. -H web1,web2".to_string()),
            });
        }
        Ok(inv)
    }
}
