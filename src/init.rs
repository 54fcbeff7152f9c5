//! `romulus init` — scaffolds a starter `romulus.yaml`. A cluster config is
//! a handful of required sections with sane defaults rather than many
//! independent free-form choices, so a single fixed template covers the
//! need without a dependency on an interactive prompt library.

use std::path::Path;

use crate::error::RomulusError;

const TEMPLATE: &str = "\
cluster:
  name: romulus
  domain: cluster.local

network:
  name: romulus-net
  mode: nat
  cidr: 192.168.100.0/24
  dhcp: true
  dns: true

storage:
  pool_name: romulus-pool
  pool_path: /var/lib/romulus/pool
  base_image:
    name: base
    url: https://cloud-images.ubuntu.com/noble/current/noble-server-cloudimg-amd64.img
    format: qcow2

nodes:
  masters:
    count: 1
    memory: 2048
    vcpus: 2
    disk_size: 20G
    ip_prefix: 10.10.10.
  workers:
    count: 2
    memory: 2048
    vcpus: 2
    disk_size: 20G
    ip_prefix: 10.10.20.

ssh:
  public_key_path: ~/.ssh/id_ed25519.pub
  user: ubuntu
";

/// Write a starter config to `path`. Fails rather than overwriting an
/// existing file — `romulus init` is meant for a fresh project directory.
pub fn run(path: &Path) -> Result<(), RomulusError> {
    if path.exists() {
        return Err(RomulusError::Validation {
            message: format!("{} already exists; remove it first if you want to start over", path.display()),
        });
    }
    std::fs::write(path, TEMPLATE).map_err(|e| RomulusError::Io {
        context: format!("writing starter config to {}", path.display()),
        source: e,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    #[test]
    fn scaffolded_config_parses_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("romulus.yaml");
        run(&path).unwrap();
        config::load_config(&path).unwrap();
    }

    #[test]
    fn refuses_to_overwrite_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("romulus.yaml");
        std::fs::write(&path, "existing").unwrap();
        assert!(run(&path).is_err());
    }
}
