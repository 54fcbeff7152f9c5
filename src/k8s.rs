//! The Kubernetes bootstrap runner: once `apply` has brought the hypervisor
//! state to the desired cluster shape, something has to SSH into each node
//! and run the actual `kubeadm init`/`kubeadm join` dance. That something is
//! out of this crate's core scope by design — the core only guarantees the
//! nodes exist, are networked, and are reachable at their `static_ip` — but
//! the trait here gives `romulus bootstrap-k8s` a real, if thin, default
//! implementation instead of leaving the subcommand a stub.
//!
//! Shells out to an external, well-tested program rather than reimplementing
//! its protocol in-process, the same way [`crate::overlay`] shells out to
//! `qemu-img` — here, `tokio::process::Command` drives `ssh` non-interactively,
//! piping a provided init script to its stdin.

use std::path::Path;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::RomulusError;
use crate::state::{Domain, Role};

#[allow(async_fn_in_trait)]
pub trait K8sBootstrapRunner {
    /// Run `script` on every domain in `domains`, in the order given.
    /// Callers are expected to pass masters before workers (the same order
    /// `projector::project` already produces) so a single-master `kubeadm
    /// init` always completes before any worker's `kubeadm join` runs.
    async fn bootstrap(&self, domains: &[Domain], script: &str) -> Result<(), RomulusError>;
}

/// Default runner: plain OpenSSH, one non-interactive session per node.
pub struct SshBootstrapRunner {
    user: String,
    private_key_path: Option<std::path::PathBuf>,
}

impl SshBootstrapRunner {
    pub fn new(user: impl Into<String>, private_key_path: Option<std::path::PathBuf>) -> Self {
        Self { user: user.into(), private_key_path }
    }

    /// Pre-flight check: if a private key path was configured, confirm it
    /// actually parses as an OpenSSH private key before attempting any SSH
    /// session — a malformed key should fail once, up front, not once per
    /// node after several nodes already succeeded.
    fn validate_key(&self) -> Result<(), RomulusError> {
        let Some(path) = &self.private_key_path else { return Ok(()) };
        ssh_key::PrivateKey::read_openssh_file(path).map_err(|e| RomulusError::Validation {
            message: format!("ssh.private_key_path '{}' is not a valid OpenSSH private key: {e}", path.display()),
        })?;
        Ok(())
    }

    async fn run_one(&self, domain: &Domain, script: &str) -> Result<(), RomulusError> {
        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "StrictHostKeyChecking=no", "-o", "UserKnownHostsFile=/dev/null"]);
        if let Some(key) = &self.private_key_path {
            cmd.args(["-i"]).arg(key);
        }
        cmd.arg(format!("{}@{}", self.user, domain.static_ip));
        cmd.arg("bash -s");
        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| RomulusError::Io {
            context: format!("spawning ssh to {}", domain.static_ip),
            source: e,
        })?;

        let mut stdin = child.stdin.take().expect("stdin was piped");
        stdin.write_all(script.as_bytes()).await.map_err(|e| RomulusError::Io {
            context: format!("writing bootstrap script to {}", domain.static_ip),
            source: e,
        })?;
        drop(stdin);

        let output = child.wait_with_output().await.map_err(|e| RomulusError::Io {
            context: format!("waiting on ssh session to {}", domain.static_ip),
            source: e,
        })?;

        if !output.status.success() {
            return Err(RomulusError::ExternalCommand {
                command: format!("ssh {}@{}", self.user, domain.static_ip),
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        tracing::info!(domain = %domain.name, ip = %domain.static_ip, "bootstrap script completed");
        Ok(())
    }
}

impl K8sBootstrapRunner for SshBootstrapRunner {
    async fn bootstrap(&self, domains: &[Domain], script: &str) -> Result<(), RomulusError> {
        self.validate_key()?;
        for domain in domains {
            self.run_one(domain, script).await?;
        }
        Ok(())
    }
}

/// Read a bootstrap script from disk. A thin wrapper so callers get a
/// consistent `RomulusError::Io` rather than a bare `std::io::Error`.
pub async fn load_script(path: &Path) -> Result<String, RomulusError> {
    tokio::fs::read_to_string(path).await.map_err(|e| RomulusError::Io {
        context: format!("reading bootstrap script {}", path.display()),
        source: e,
    })
}

/// Sort `domains` masters-first, preserving each role's existing order —
/// the ordering `bootstrap` depends on, re-derived defensively in case a
/// caller hands over a current-state snapshot rather than `projector`'s
/// output.
pub fn masters_first(mut domains: Vec<Domain>) -> Vec<Domain> {
    domains.sort_by_key(|d| (d.role != Role::Master, d.index));
    domains
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Role;

    fn domain(name: &str, role: Role, index: u32) -> Domain {
        Domain {
            name: name.into(),
            memory_mib: 2048,
            vcpus: 2,
            disk_volume: format!("{name}-disk"),
            cloudinit_volume: format!("{name}-init.iso"),
            network: "n".into(),
            mac_address: "52:54:00:00:00:01".into(),
            static_ip: "10.10.10.1".into(),
            role,
            index,
        }
    }

    #[test]
    fn masters_first_reorders_workers_after_masters() {
        let domains = vec![
            domain("k8s-worker-1", Role::Worker, 1),
            domain("k8s-master-1", Role::Master, 1),
        ];
        let ordered = masters_first(domains);
        assert_eq!(ordered[0].role, Role::Master);
        assert_eq!(ordered[1].role, Role::Worker);
    }

    #[test]
    fn masters_first_preserves_index_order_within_role() {
        let domains = vec![
            domain("k8s-master-2", Role::Master, 2),
            domain("k8s-master-1", Role::Master, 1),
        ];
        let ordered = masters_first(domains);
        assert_eq!(ordered[0].index, 1);
        assert_eq!(ordered[1].index, 2);
    }

    #[test]
    fn validate_key_passes_when_no_key_configured() {
        let runner = SshBootstrapRunner::new("ubuntu", None);
        assert!(runner.validate_key().is_ok());
    }

    #[test]
    fn validate_key_rejects_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id_ed25519");
        std::fs::write(&path, "not a key").unwrap();
        let runner = SshBootstrapRunner::new("ubuntu", Some(path));
        assert!(runner.validate_key().is_err());
    }
}
