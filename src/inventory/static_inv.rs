// Static YAML inventory parser

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use super::{Host, Inventory, InventoryPlugin};
use crate::output::errors::ArmadaError;

/// Inventory plugin reading hosts from a YAML file
///
/// The file is a mapping of host key to host attributes:
///
/// ```yaml
/// dev1:
///   hostname: 10.0.0.11
///   port: 2222
///   username: deploy
///   platform: linux
///   data:
///     role: web
/// ```
///
/// A `hosts:` wrapper (mapping or list of `{name: ...}` entries) and a
/// `defaults:` section with `username`/`port`/`platform` are accepted too.
#[derive(Debug, Clone)]
pub struct FromYaml {
    pub hosts_file: PathBuf,
}

impl FromYaml {
    pub fn new(hosts_file: impl Into<PathBuf>) -> Self {
        FromYaml {
            hosts_file: hosts_file.into(),
        }
    }
}

impl InventoryPlugin for FromYaml {
    fn create(&self) -> Result<Inventory, ArmadaError> {
        parse_inventory_file(&self.hosts_file)
    }
}

/// Parse inventory from a YAML file
pub fn parse_inventory_file(path: &Path) -> Result<Inventory, ArmadaError> {
    let content = std::fs::read_to_string(path).map_err(|e| ArmadaError::Io {
        message: "problem reading hosts file".to_string(),
        path: Some(path.to_path_buf()),
        source: e,
    })?;

    parse_inventory(&content)
}

/// Parse inventory from a YAML string
pub fn parse_inventory(content: &str) -> Result<Inventory, ArmadaError> {
    let yaml: Value = serde_yaml::from_str(content)?;

    let root = match &yaml {
        Value::Mapping(map) => map,
        Value::Null => return Ok(Inventory::new()),
        _ => {
            return Err(ArmadaError::Inventory {
                message: "Inventory must be a YAML mapping".to_string(),
                suggestion: Some("Start with a host key, e.g. 'dev1:'".to_string()),
            });
        }
    };

    let defaults = root.get("defaults").and_then(Value::as_mapping);
    let mut inventory = Inventory::new();

    match root.get("hosts") {
        Some(Value::Sequence(entries)) => {
            for entry in entries {
                let Some(map) = entry.as_mapping() else {
                    if let Some(name) = entry.as_str() {
                        inventory.add_host(name, build_host(name, None, defaults)?);
                    }
                    continue;
                };

                let name = map.get("name").and_then(Value::as_str).ok_or_else(|| {
                    ArmadaError::Inventory {
                        message: "host entry in list is missing 'name'".to_string(),
                        suggestion: Some("Add 'name: <key>' to every host in the list".to_string()),
                    }
                })?;
                inventory.add_host(name, build_host(name, Some(map), defaults)?);
            }
        }
        Some(Value::Mapping(hosts)) => parse_host_map(hosts, defaults, &mut inventory)?,
        Some(_) => {
            return Err(ArmadaError::Inventory {
                message: "'hosts' must be a mapping or a list".to_string(),
                suggestion: None,
            });
        }
        None => parse_host_map(root, defaults, &mut inventory)?,
    }

    Ok(inventory)
}

fn parse_host_map(
    hosts: &Mapping,
    defaults: Option<&Mapping>,
    inventory: &mut Inventory,
) -> Result<(), ArmadaError> {
    for (key, value) in hosts {
        let Some(name) = key.as_str() else {
            continue;
        };
        if name == "defaults" {
            continue;
        }

        let host = build_host(name, value.as_mapping(), defaults)?;
        inventory.add_host(name, host);
    }

    Ok(())
}

fn build_host(
    key: &str,
    attrs: Option<&Mapping>,
    defaults: Option<&Mapping>,
) -> Result<Host, ArmadaError> {
    let mut host = Host::new(key);

    // Defaults first so per-host attributes win
    if let Some(defaults) = defaults {
        apply_host_vars(key, &mut host, defaults)?;
        host.hostname = key.to_string();
    }
    if let Some(attrs) = attrs {
        apply_host_vars(key, &mut host, attrs)?;
    }

    Ok(host)
}

fn apply_host_vars(key: &str, host: &mut Host, map: &Mapping) -> Result<(), ArmadaError> {
    for (k, v) in map {
        let Some(attr) = k.as_str() else {
            continue;
        };

        match attr {
            "name" => {} // Already the key
            "hostname" | "address" | "host" => {
                if let Some(addr) = v.as_str() {
                    host.hostname = addr.to_string();
                }
            }
            "port" => {
                host.port = v
                    .as_u64()
                    .and_then(|p| u16::try_from(p).ok())
                    .ok_or_else(|| ArmadaError::Inventory {
                        message: format!("host '{}' has an invalid port: {:?}", key, v),
                        suggestion: Some("Ports must be integers between 0 and 65535".to_string()),
                    })?;
            }
            "username" | "user" => {
                if let Some(u) = v.as_str() {
                    host.username = u.to_string();
                }
            }
            "password" => {
                if let Some(p) = v.as_str() {
                    host.password = p.to_string();
                }
            }
            "platform" => {
                if let Some(p) = v.as_str() {
                    host.platform = p.to_string();
                }
            }
            "data" => {
                if let Some(data) = v.as_mapping() {
                    for (dk, dv) in data {
                        if let Some(dk) = dk.as_str() {
                            host.data.insert(dk.to_string(), dv.clone());
                        }
                    }
                }
            }
            _ => {
                // Anything unknown lands in the data bag
                host.data.insert(attr.to_string(), v.clone());
            }
        }
    }

    Ok(())
}
