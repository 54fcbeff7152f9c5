//! An in-memory [`HypervisorAdapter`] — the fake every planner/executor test
//! in this crate runs against, so those tests exercise real diff/plan/apply
//! logic without a live libvirt connection.

use std::sync::Mutex;

use crate::error::RomulusError;
use crate::state::{Domain, Network, Pool, State, Volume};

use super::HypervisorAdapter;

#[derive(Debug, Default)]
pub struct MemoryAdapter {
    state: Mutex<State>,
    /// Every call this adapter has handled, in order — `"create pool p"`,
    /// `"destroy domain k8s-worker-1"`, etc. Tests assert on this to check
    /// execution order without a real hypervisor to observe.
    pub calls: Mutex<Vec<String>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(state: State) -> Self {
        Self { state: Mutex::new(state), calls: Mutex::new(Vec::new()) }
    }

    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

impl HypervisorAdapter for MemoryAdapter {
    async fn current_state(&self) -> Result<State, RomulusError> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn create_pool(&self, pool: &Pool) -> Result<(), RomulusError> {
        self.log(format!("create pool {}", pool.name));
        self.state.lock().unwrap().pools.push(pool.clone());
        Ok(())
    }

    async fn destroy_pool(&self, pool: &Pool) -> Result<(), RomulusError> {
        self.log(format!("destroy pool {}", pool.name));
        self.state.lock().unwrap().pools.retain(|p| p.name != pool.name);
        Ok(())
    }

    async fn create_network(&self, network: &Network) -> Result<(), RomulusError> {
        self.log(format!("create network {}", network.name));
        self.state.lock().unwrap().networks.push(network.clone());
        Ok(())
    }

    async fn destroy_network(&self, network: &Network) -> Result<(), RomulusError> {
        self.log(format!("destroy network {}", network.name));
        self.state.lock().unwrap().networks.retain(|n| n.name != network.name);
        Ok(())
    }

    async fn create_disk_volume(&self, volume: &Volume) -> Result<(), RomulusError> {
        self.log(format!("create disk volume {}", volume.name));
        self.state.lock().unwrap().volumes.push(volume.clone());
        Ok(())
    }

    async fn create_cloudinit_volume(
        &self,
        volume: &Volume,
        iso_bytes: Vec<u8>,
    ) -> Result<(), RomulusError> {
        self.log(format!("create cloud-init volume {} ({} bytes)", volume.name, iso_bytes.len()));
        self.state.lock().unwrap().volumes.push(volume.clone());
        Ok(())
    }

    async fn destroy_volume(&self, volume: &Volume) -> Result<(), RomulusError> {
        self.log(format!("destroy volume {}", volume.name));
        self.state
            .lock()
            .unwrap()
            .volumes
            .retain(|v| !(v.pool == volume.pool && v.name == volume.name));
        Ok(())
    }

    async fn create_domain(&self, domain: &Domain) -> Result<(), RomulusError> {
        self.log(format!("create domain {}", domain.name));
        self.state.lock().unwrap().domains.push(domain.clone());
        Ok(())
    }

    async fn destroy_domain(&self, domain: &Domain) -> Result<(), RomulusError> {
        self.log(format!("destroy domain {}", domain.name));
        self.state.lock().unwrap().domains.retain(|d| d.name != domain.name);
        Ok(())
    }
}
