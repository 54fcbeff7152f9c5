//! Typed containers for the four hypervisor resource kinds, plus the
//! immutable `State` snapshot and the consistency checks the planner
//! requires before it will emit a plan.

use std::fmt;

use crate::error::RomulusError;

/// libvirt network forwarding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    Nat,
    Isolated,
    Route,
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkMode::Nat => "nat",
            NetworkMode::Isolated => "isolated",
            NetworkMode::Route => "route",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    pub name: String,
    pub mode: NetworkMode,
    pub cidr: String,
    pub dhcp: bool,
    pub dns: bool,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pool {
    pub name: String,
    pub path: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeFormat {
    Qcow2,
    Raw,
    Iso,
}

impl fmt::Display for VolumeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VolumeFormat::Qcow2 => "qcow2",
            VolumeFormat::Raw => "raw",
            VolumeFormat::Iso => "iso",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub pool: String,
    pub name: String,
    pub format: VolumeFormat,
    pub capacity_bytes: u64,
    pub source_url: Option<String>,
    pub backing_volume: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Worker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Master => "master",
            Role::Worker => "worker",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    pub name: String,
    pub memory_mib: u64,
    pub vcpus: u32,
    pub disk_volume: String,
    pub cloudinit_volume: String,
    pub network: String,
    pub mac_address: String,
    pub static_ip: String,
    pub role: Role,
    pub index: u32,
}

/// Identity of a resource within its kind — what the planner matches on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Network(String),
    Pool(String),
    Volume(String, String),
    Domain(String),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Network(n) => write!(f, "network '{n}'"),
            Identity::Pool(n) => write!(f, "pool '{n}'"),
            Identity::Volume(p, n) => write!(f, "volume '{p}/{n}'"),
            Identity::Domain(n) => write!(f, "domain '{n}'"),
        }
    }
}

impl Network {
    pub fn identity(&self) -> Identity {
        Identity::Network(self.name.clone())
    }
}

impl Pool {
    pub fn identity(&self) -> Identity {
        Identity::Pool(self.name.clone())
    }
}

impl Volume {
    pub fn identity(&self) -> Identity {
        Identity::Volume(self.pool.clone(), self.name.clone())
    }
}

impl Domain {
    pub fn identity(&self) -> Identity {
        Identity::Domain(self.name.clone())
    }
}

/// Immutable snapshot of all managed hypervisor resources at an instant.
///
/// Produced fresh on every invocation — either queried from the hypervisor
/// ("current") or projected from configuration ("desired"). There is no
/// persistent local state store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    pub networks: Vec<Network>,
    pub pools: Vec<Pool>,
    pub volumes: Vec<Volume>,
    pub domains: Vec<Domain>,
}

impl State {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validate internal consistency: unique identifiers per kind, and
    /// every cross-reference (volume→pool, domain→{pool-of-disk, network})
    /// resolves within this snapshot.
    pub fn validate(&self) -> Result<(), RomulusError> {
        check_unique(self.networks.iter().map(|n| &n.name), "network")?;
        check_unique(self.pools.iter().map(|p| &p.name), "pool")?;
        check_unique(
            self.volumes.iter().map(|v| (v.pool.as_str(), v.name.as_str())),
            "volume",
        )?;
        check_unique(self.domains.iter().map(|d| &d.name), "domain")?;

        for v in &self.volumes {
            if !self.pools.iter().any(|p| p.name == v.pool) {
                return Err(RomulusError::Consistency {
                    message: format!(
                        "volume '{}' references unknown pool '{}'",
                        v.name, v.pool
                    ),
                });
            }
            if let Some(backing) = &v.backing_volume
                && !self.volumes.iter().any(|o| &o.name == backing)
            {
                return Err(RomulusError::Consistency {
                    message: format!(
                        "volume '{}' has unknown backing volume '{backing}'",
                        v.name
                    ),
                });
            }
        }

        for d in &self.domains {
            if !self.networks.iter().any(|n| n.name == d.network) {
                return Err(RomulusError::Consistency {
                    message: format!(
                        "domain '{}' references unknown network '{}'",
                        d.name, d.network
                    ),
                });
            }
            if !self.volumes.iter().any(|v| v.name == d.disk_volume) {
                return Err(RomulusError::Consistency {
                    message: format!(
                        "domain '{}' references unknown disk volume '{}'",
                        d.name, d.disk_volume
                    ),
                });
            }
            if !self.volumes.iter().any(|v| v.name == d.cloudinit_volume) {
                return Err(RomulusError::Consistency {
                    message: format!(
                        "domain '{}' references unknown cloud-init volume '{}'",
                        d.name, d.cloudinit_volume
                    ),
                });
            }
        }

        Ok(())
    }
}

fn check_unique<T, I>(iter: I, kind: &str) -> Result<(), RomulusError>
where
    T: Eq + std::hash::Hash + fmt::Debug,
    I: Iterator<Item = T>,
{
    let mut seen = std::collections::HashSet::new();
    for item in iter {
        if !seen.insert(item) {
            return Err(RomulusError::Consistency {
                message: format!("duplicate {kind} identity in snapshot"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(name: &str) -> Pool {
        Pool {
            name: name.into(),
            path: format!("/var/lib/romulus/{name}"),
            active: true,
        }
    }

    fn network(name: &str) -> Network {
        Network {
            name: name.into(),
            mode: NetworkMode::Nat,
            cidr: "192.168.100.0/24".into(),
            dhcp: true,
            dns: true,
            active: true,
        }
    }

    #[test]
    fn empty_state_is_valid() {
        assert!(State::empty().validate().is_ok());
    }

    #[test]
    fn dangling_volume_pool_reference_fails() {
        let state = State {
            pools: vec![],
            volumes: vec![Volume {
                pool: "ghost".into(),
                name: "disk".into(),
                format: VolumeFormat::Qcow2,
                capacity_bytes: 1024,
                source_url: None,
                backing_volume: None,
            }],
            ..State::default()
        };
        let err = state.validate().unwrap_err();
        assert!(format!("{err}").contains("ghost") || format!("{err:?}").contains("ghost"));
    }

    #[test]
    fn dangling_domain_network_reference_fails() {
        let state = State {
            pools: vec![pool("p")],
            networks: vec![],
            volumes: vec![
                Volume {
                    pool: "p".into(),
                    name: "k8s-master-1-disk".into(),
                    format: VolumeFormat::Qcow2,
                    capacity_bytes: 1,
                    source_url: None,
                    backing_volume: None,
                },
                Volume {
                    pool: "p".into(),
                    name: "k8s-master-1-init.iso".into(),
                    format: VolumeFormat::Iso,
                    capacity_bytes: 1,
                    source_url: None,
                    backing_volume: None,
                },
            ],
            domains: vec![Domain {
                name: "k8s-master-1".into(),
                memory_mib: 2048,
                vcpus: 2,
                disk_volume: "k8s-master-1-disk".into(),
                cloudinit_volume: "k8s-master-1-init.iso".into(),
                network: "ghost-net".into(),
                mac_address: "52:54:00:00:00:01".into(),
                static_ip: "10.10.10.1".into(),
                role: Role::Master,
                index: 1,
            }],
        };
        assert!(state.validate().is_err());
    }

    #[test]
    fn duplicate_identity_fails() {
        let state = State {
            pools: vec![pool("p"), pool("p")],
            ..State::default()
        };
        assert!(state.validate().is_err());
    }

    #[test]
    fn consistent_state_is_valid() {
        let state = State {
            pools: vec![pool("p")],
            networks: vec![network("n")],
            volumes: vec![
                Volume {
                    pool: "p".into(),
                    name: "base".into(),
                    format: VolumeFormat::Qcow2,
                    capacity_bytes: 1,
                    source_url: Some("https://example.com/base.qcow2".into()),
                    backing_volume: None,
                },
                Volume {
                    pool: "p".into(),
                    name: "k8s-master-1-disk".into(),
                    format: VolumeFormat::Qcow2,
                    capacity_bytes: 1,
                    source_url: None,
                    backing_volume: Some("base".into()),
                },
                Volume {
                    pool: "p".into(),
                    name: "k8s-master-1-init.iso".into(),
                    format: VolumeFormat::Iso,
                    capacity_bytes: 1,
                    source_url: None,
                    backing_volume: None,
                },
            ],
            domains: vec![Domain {
                name: "k8s-master-1".into(),
                memory_mib: 2048,
                vcpus: 2,
                disk_volume: "k8s-master-1-disk".into(),
                cloudinit_volume: "k8s-master-1-init.iso".into(),
                network: "n".into(),
                mac_address: "52:54:00:00:00:01".into(),
                static_ip: "10.10.10.1".into(),
                role: Role::Master,
                index: 1,
            }],
        };
        assert!(state.validate().is_ok());
    }
}
