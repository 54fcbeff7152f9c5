//! Maps a validated [`Config`] to a fully-populated desired [`State`]
//! snapshot. Deterministic and total over validated config — same config
//! always yields an identically-ordered snapshot.

use crate::config::Config;
use crate::state::{Domain, Network, NetworkMode, Pool, Role, State, Volume, VolumeFormat};
use crate::util::node_ip;

/// Project a desired [`State`] from validated configuration.
///
/// Ordering: one network, one pool, then the base-image volume, then disk +
/// cloud-init volume pairs for masters (1-based index, dense) followed by
/// workers, then one domain per node — masters always precede workers,
/// each ordered by index.
pub fn project(config: &Config) -> State {
    let network = Network {
        name: config.network.name.clone(),
        mode: parse_mode(&config.network.mode),
        cidr: config.network.cidr.clone(),
        dhcp: config.network.dhcp,
        dns: config.network.dns,
        active: true,
    };

    let pool = Pool {
        name: config.storage.pool_name.clone(),
        path: config.storage.pool_path.clone(),
        active: true,
    };

    let base_image = Volume {
        pool: pool.name.clone(),
        name: config.storage.base_image.name.clone(),
        format: parse_format(&config.storage.base_image.format),
        capacity_bytes: 0,
        source_url: Some(config.storage.base_image.url.clone()),
        backing_volume: None,
    };

    let mut volumes = vec![base_image.clone()];
    let mut domains = Vec::new();

    for (role, group) in [
        (Role::Master, &config.nodes.masters),
        (Role::Worker, &config.nodes.workers),
    ] {
        for i in 1..=group.count {
            let name = format!("{}-{role}-{i}", config.cluster.name);
            let disk_name = format!("{name}-disk");
            let cloudinit_name = format!("{name}-init.iso");

            volumes.push(Volume {
                pool: pool.name.clone(),
                name: disk_name.clone(),
                format: VolumeFormat::Qcow2,
                capacity_bytes: crate::util::parse_size(&group.disk_size).unwrap_or(0),
                source_url: None,
                backing_volume: Some(base_image.name.clone()),
            });

            volumes.push(Volume {
                pool: pool.name.clone(),
                name: cloudinit_name.clone(),
                format: VolumeFormat::Iso,
                capacity_bytes: 0,
                source_url: None,
                backing_volume: None,
            });

            domains.push(Domain {
                name: name.clone(),
                memory_mib: group.memory,
                vcpus: group.vcpus,
                disk_volume: disk_name,
                cloudinit_volume: cloudinit_name,
                network: network.name.clone(),
                mac_address: generate_mac(&name, i),
                static_ip: node_ip(&group.ip_prefix, i),
                role,
                index: i,
            });
        }
    }

    State {
        networks: vec![network],
        pools: vec![pool],
        volumes,
        domains,
    }
}

fn parse_mode(s: &str) -> NetworkMode {
    match s {
        "isolated" => NetworkMode::Isolated,
        "route" => NetworkMode::Route,
        _ => NetworkMode::Nat,
    }
}

fn parse_format(s: &str) -> VolumeFormat {
    match s {
        "raw" => VolumeFormat::Raw,
        "iso" => VolumeFormat::Iso,
        _ => VolumeFormat::Qcow2,
    }
}

/// Deterministically derive a locally-administered MAC address from
/// `(domain name, index)`. The `52:54:00` prefix is QEMU/KVM's reserved
/// OUI, matching how libvirt's own auto-generated MACs are styled.
pub fn generate_mac(name: &str, index: u32) -> String {
    let mut hash: u32 = 5381;
    for b in name.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as u32);
    }
    hash = hash.wrapping_add(index);
    let b4 = (hash >> 16) & 0xff;
    let b5 = (hash >> 8) & 0xff;
    let b6 = hash & 0xff;
    format!("52:54:00:{b4:02x}:{b5:02x}:{b6:02x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::*;

    fn config(masters: u32, workers: u32) -> Config {
        Config {
            cluster: ClusterConfig {
                name: "k8s".into(),
                domain: "cluster.local".into(),
            },
            network: NetworkConfig {
                name: "n".into(),
                mode: "nat".into(),
                cidr: "192.168.100.0/24".into(),
                dhcp: true,
                dns: true,
            },
            storage: StorageConfig {
                pool_name: "p".into(),
                pool_path: "/var/lib/romulus/p".into(),
                base_image: BaseImageConfig {
                    name: "base".into(),
                    url: "https://example.com/base.qcow2".into(),
                    format: "qcow2".into(),
                },
            },
            nodes: NodesConfig {
                masters: NodeGroupConfig {
                    count: masters,
                    memory: 2048,
                    vcpus: 2,
                    disk_size: "20G".into(),
                    ip_prefix: "10.10.10.".into(),
                },
                workers: NodeGroupConfig {
                    count: workers,
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
    fn minimal_cluster_has_expected_resource_counts() {
        let state = project(&config(1, 1));
        assert_eq!(state.networks.len(), 1);
        assert_eq!(state.pools.len(), 1);
        // base image + 2 disks + 2 cloud-init volumes
        assert_eq!(state.volumes.len(), 5);
        assert_eq!(state.domains.len(), 2);
        state.validate().unwrap();
    }

    #[test]
    fn domain_and_volume_names_match_scenario_naming() {
        let state = project(&config(1, 1));
        let names: Vec<&str> = state.domains.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["k8s-master-1", "k8s-worker-1"]);
        assert!(
            state
                .volumes
                .iter()
                .any(|v| v.name == "k8s-worker-1-disk")
        );
        assert!(
            state
                .volumes
                .iter()
                .any(|v| v.name == "k8s-worker-1-init.iso")
        );
    }

    #[test]
    fn masters_precede_workers_and_indices_are_dense() {
        let state = project(&config(2, 2));
        let names: Vec<&str> = state.domains.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["k8s-master-1", "k8s-master-2", "k8s-worker-1", "k8s-worker-2"]
        );
    }

    #[test]
    fn static_ip_follows_prefix_plus_index() {
        let state = project(&config(2, 1));
        let master2 = state.domains.iter().find(|d| d.name == "k8s-master-2").unwrap();
        assert_eq!(master2.static_ip, "10.10.10.2");
        let worker1 = state.domains.iter().find(|d| d.name == "k8s-worker-1").unwrap();
        assert_eq!(worker1.static_ip, "10.10.20.1");
    }

    #[test]
    fn projection_is_deterministic() {
        let cfg = config(2, 2);
        assert_eq!(project(&cfg), project(&cfg));
    }

    #[test]
    fn zero_workers_is_allowed() {
        let state = project(&config(1, 0));
        assert_eq!(state.domains.len(), 1);
        state.validate().unwrap();
    }
}
