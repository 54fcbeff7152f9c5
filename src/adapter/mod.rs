//! The hypervisor boundary: everything the executor needs from a live
//! hypervisor, behind one trait, so the planner/executor tests run against
//! [`memory::MemoryAdapter`] instead of a real libvirt daemon.

pub mod libvirt;
pub mod memory;

use crate::error::RomulusError;
use crate::state::{Domain, Network, Pool, State, Volume};

/// Queries and mutations against a hypervisor, one method per action shape.
/// Volume creation is split in two because cloud-init volumes carry
/// pre-rendered ISO bytes the adapter has no way to produce itself — the
/// executor renders them (see [`crate::cloudinit`]) and hands over the
/// finished image.
#[allow(async_fn_in_trait)]
pub trait HypervisorAdapter {
    /// Query everything this adapter manages, assembled into one [`State`]
    /// snapshot — the "current" side of every diff.
    async fn current_state(&self) -> Result<State, RomulusError>;

    async fn create_pool(&self, pool: &Pool) -> Result<(), RomulusError>;
    async fn destroy_pool(&self, pool: &Pool) -> Result<(), RomulusError>;

    async fn create_network(&self, network: &Network) -> Result<(), RomulusError>;
    async fn destroy_network(&self, network: &Network) -> Result<(), RomulusError>;

    /// Create a disk volume: a fresh base-image download if `source_url` is
    /// set, a qcow2 overlay if `backing_volume` is set, or an empty volume
    /// otherwise.
    async fn create_disk_volume(&self, volume: &Volume) -> Result<(), RomulusError>;

    /// Create a cloud-init seed volume from already-rendered ISO bytes.
    async fn create_cloudinit_volume(
        &self,
        volume: &Volume,
        iso_bytes: Vec<u8>,
    ) -> Result<(), RomulusError>;

    async fn destroy_volume(&self, volume: &Volume) -> Result<(), RomulusError>;

    async fn create_domain(&self, domain: &Domain) -> Result<(), RomulusError>;
    async fn destroy_domain(&self, domain: &Domain) -> Result<(), RomulusError>;
}
