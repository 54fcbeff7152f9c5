//! Closed record types for the `romulus.yaml` configuration file,
//! with a validating parser at the boundary — everything downstream (the
//! projector, planner, executor) operates on these typed, already-validated
//! values.

use std::path::{Path, PathBuf};

use facet::Facet;

use crate::error::RomulusError;
use crate::util::parse_size;

#[derive(Debug, Clone, Facet)]
pub struct Config {
    pub cluster: ClusterConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    pub nodes: NodesConfig,
    pub ssh: SshConfig,
}

#[derive(Debug, Clone, Facet)]
pub struct ClusterConfig {
    pub name: String,
    pub domain: String,
}

#[derive(Debug, Clone, Facet)]
pub struct NetworkConfig {
    pub name: String,
    pub mode: String,
    pub cidr: String,
    #[facet(default = true)]
    pub dhcp: bool,
    #[facet(default = true)]
    pub dns: bool,
}

#[derive(Debug, Clone, Facet)]
pub struct StorageConfig {
    pub pool_name: String,
    pub pool_path: String,
    pub base_image: BaseImageConfig,
}

#[derive(Debug, Clone, Facet)]
pub struct BaseImageConfig {
    pub name: String,
    pub url: String,
    pub format: String,
}

#[derive(Debug, Clone, Facet)]
pub struct NodesConfig {
    pub masters: NodeGroupConfig,
    #[facet(default)]
    pub workers: NodeGroupConfig,
}

#[derive(Debug, Clone, Default, Facet)]
#[facet(default)]
pub struct NodeGroupConfig {
    #[facet(default)]
    pub count: u32,
    #[facet(default = 2048)]
    pub memory: u64,
    #[facet(default = 2)]
    pub vcpus: u32,
    #[facet(default = "20G")]
    pub disk_size: String,
    #[facet(default)]
    pub ip_prefix: String,
}

#[derive(Debug, Clone, Facet)]
pub struct SshConfig {
    pub public_key_path: String,
    #[facet(default)]
    pub private_key_path: Option<String>,
    pub user: String,
}

impl Config {
    fn validate(&self) -> Result<(), RomulusError> {
        validate_group(&self.nodes.masters, "masters", true)?;
        validate_group(&self.nodes.workers, "workers", false)?;
        validate_cidr(&self.network.cidr)?;
        Ok(())
    }

    /// Home-relative (`~/...`) expansion for `ssh.*` paths.
    pub fn ssh_public_key_path(&self) -> PathBuf {
        expand_home(&self.ssh.public_key_path)
    }

    pub fn ssh_private_key_path(&self) -> Option<PathBuf> {
        self.ssh.private_key_path.as_deref().map(expand_home)
    }
}

fn validate_group(group: &NodeGroupConfig, label: &str, required: bool) -> Result<(), RomulusError> {
    if required && group.count < 1 {
        return Err(RomulusError::Validation {
            message: format!("nodes.{label}.count must be at least 1"),
        });
    }
    if group.count == 0 {
        return Ok(());
    }
    if group.memory < 512 {
        return Err(RomulusError::Validation {
            message: format!("nodes.{label}.memory must be at least 512 (MiB)"),
        });
    }
    if group.vcpus < 1 {
        return Err(RomulusError::Validation {
            message: format!("nodes.{label}.vcpus must be at least 1"),
        });
    }
    let disk_bytes = parse_size(&group.disk_size).map_err(|_| RomulusError::Validation {
        message: format!(
            "nodes.{label}.disk_size is not a valid size: '{}'",
            group.disk_size
        ),
    })?;
    if disk_bytes < 1024 * 1024 * 1024 {
        return Err(RomulusError::Validation {
            message: format!("nodes.{label}.disk_size must be at least 1 GiB"),
        });
    }
    validate_ip_prefix(&group.ip_prefix, label)?;
    Ok(())
}

/// `ip_prefix` must be a dotted-quad prefix ending in a dot (e.g.
/// `"10.10.10."`), such that `prefix + index` yields a valid address.
fn validate_ip_prefix(prefix: &str, label: &str) -> Result<(), RomulusError> {
    if !prefix.ends_with('.') {
        return Err(RomulusError::Validation {
            message: format!("nodes.{label}.ip_prefix must end in a dot (e.g. '10.10.10.')"),
        });
    }
    let octets: Vec<&str> = prefix.trim_end_matches('.').split('.').collect();
    if octets.len() != 3 || !octets.iter().all(|o| o.parse::<u8>().is_ok()) {
        return Err(RomulusError::Validation {
            message: format!(
                "nodes.{label}.ip_prefix must be a dotted-quad prefix, got '{prefix}'"
            ),
        });
    }
    Ok(())
}

fn validate_cidr(cidr: &str) -> Result<(), RomulusError> {
    let (addr, prefix_len) = cidr.split_once('/').ok_or_else(|| RomulusError::Validation {
        message: format!("network.cidr must be IPv4 CIDR (got '{cidr}')"),
    })?;
    let octets: Vec<&str> = addr.split('.').collect();
    let valid_addr = octets.len() == 4 && octets.iter().all(|o| o.parse::<u8>().is_ok());
    let valid_len = prefix_len.parse::<u8>().is_ok_and(|n| n <= 32);
    if !valid_addr || !valid_len {
        return Err(RomulusError::Validation {
            message: format!("network.cidr must be IPv4 CIDR (got '{cidr}')"),
        });
    }
    Ok(())
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

pub fn load_config(path: &Path) -> Result<Config, RomulusError> {
    let contents = std::fs::read_to_string(path).map_err(|source| RomulusError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    let config: Config = facet_yaml::from_str(&contents).map_err(|e| RomulusError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            cluster: ClusterConfig {
                name: "romulus".into(),
                domain: "cluster.local".into(),
            },
            network: NetworkConfig {
                name: "romulus-net".into(),
                mode: "nat".into(),
                cidr: "192.168.100.0/24".into(),
                dhcp: true,
                dns: true,
            },
            storage: StorageConfig {
                pool_name: "romulus-pool".into(),
                pool_path: "/var/lib/romulus/pool".into(),
                base_image: BaseImageConfig {
                    name: "base".into(),
                    url: "https://example.com/base.qcow2".into(),
                    format: "qcow2".into(),
                },
            },
            nodes: NodesConfig {
                masters: NodeGroupConfig {
                    count: 1,
                    memory: 2048,
                    vcpus: 2,
                    disk_size: "20G".into(),
                    ip_prefix: "10.10.10.".into(),
                },
                workers: NodeGroupConfig {
                    count: 1,
                    memory: 2048,
                    vcpus: 2,
                    disk_size: "20G".into(),
                    ip_prefix: "10.10.20.".into(),
                },
            },
            ssh: SshConfig {
                public_key_path: "~/.ssh/id_ed25519.pub".into(),
                private_key_path: None,
                user: "ubuntu".into(),
            },
        }
    }

    #[test]
    fn baseline_config_is_valid() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn masters_count_must_be_at_least_one() {
        let mut c = valid_config();
        c.nodes.masters.count = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn workers_count_zero_is_allowed() {
        let mut c = valid_config();
        c.nodes.workers.count = 0;
        c.validate().unwrap();
    }

    #[test]
    fn memory_below_minimum_rejected() {
        let mut c = valid_config();
        c.nodes.masters.memory = 256;
        assert!(c.validate().is_err());
    }

    #[test]
    fn disk_size_below_minimum_rejected() {
        let mut c = valid_config();
        c.nodes.masters.disk_size = "512M".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn ip_prefix_without_trailing_dot_rejected() {
        let mut c = valid_config();
        c.nodes.masters.ip_prefix = "10.10.10".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn malformed_cidr_rejected() {
        let mut c = valid_config();
        c.network.cidr = "not-a-cidr".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn home_relative_ssh_path_expands() {
        let c = valid_config();
        let resolved = c.ssh_public_key_path();
        assert!(!resolved.to_string_lossy().starts_with('~'));
    }
}
