//! Production [`HypervisorAdapter`] backed by a live libvirt connection.
//!
//! Uses a `Drop`-closing `ConnGuard`, `clear_error_callback()` to suppress
//! libvirt's stderr handler, and destroy/undefine-then-redefine patterns for
//! domains, networks, and pools — no resource kind has a live in-place
//! update call here; the executor rewrites every `Update` into a
//! destroy-then-create pair before this adapter ever sees it. Resource XML
//! comes from `domain_xml`/`network_xml`/`pool_xml`/`volume_xml`; volumes with no
//! backing file are empty qcow2/ISO images built in-process
//! ([`crate::qcow2`], [`crate::iso9660`] via [`crate::cloudinit`]); volumes
//! with a backing file go through [`crate::overlay`]'s `qemu-img` call.

use virt::error as virt_error;
use virt::connect::Connect;
use virt::domain::Domain as VirDomain;
use virt::network::Network as VirNetwork;
use virt::storage_pool::StoragePool;
use virt::storage_vol::StorageVol;

use crate::error::RomulusError;
use crate::state::{Domain, Network, Pool, State, Volume, VolumeFormat};
use crate::{domain_xml, image, network_xml, overlay, paths, pool_xml, qcow2, volume_xml};

use super::HypervisorAdapter;

struct ConnGuard(Connect);

impl std::ops::Deref for ConnGuard {
    type Target = Connect;
    fn deref(&self) -> &Connect {
        &self.0
    }
}

impl Drop for ConnGuard {
    fn drop(&mut self) {
        self.0.close().ok();
    }
}

fn connect(uri: &str) -> Result<ConnGuard, RomulusError> {
    virt_error::clear_error_callback();
    Connect::open(Some(uri)).map(ConnGuard).map_err(|e| RomulusError::Libvirt {
        message: format!("failed to connect to libvirt: {e}"),
        hint: format!("ensure libvirtd is running and you have access to {uri}"),
    })
}

fn libvirt_err(action: &str) -> impl Fn(virt::error::Error) -> RomulusError + '_ {
    move |e| RomulusError::Libvirt {
        message: format!("{action} failed: {e}"),
        hint: "check libvirt permissions and the generated XML".into(),
    }
}

/// A production adapter bound to one libvirt connection URI (e.g.
/// `qemu:///system`). Each call opens and closes its own connection —
/// libvirt connections are cheap and this keeps the adapter `Send + Sync`
/// without a persistent handle to manage.
pub struct LibvirtAdapter {
    uri: String,
}

impl LibvirtAdapter {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// Pull the text content of `<tag>...</tag>`'s first occurrence.
fn scrape_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let start = xml.find(&open)? + open.len();
    let close = format!("</{tag}>");
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].to_string())
}

/// Pull an attribute value from the first tag named `tag`.
fn scrape_attr(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let tag_start = xml.find(&format!("<{tag} "))?;
    let tag_end = xml[tag_start..].find('>').map(|i| tag_start + i)?;
    let section = &xml[tag_start..tag_end];
    for quote in ['"', '\''] {
        let prefix = format!("{attr}={quote}");
        if let Some(i) = section.find(&prefix) {
            let start = i + prefix.len();
            if let Some(end) = section[start..].find(quote) {
                return Some(section[start..start + end].to_string());
            }
        }
    }
    None
}

fn pool_path_from_xml(xml: &str) -> String {
    scrape_text(xml, "path").unwrap_or_default()
}

fn list_pools(conn: &Connect) -> Result<Vec<Pool>, RomulusError> {
    let pools = conn.list_all_storage_pools(0).map_err(libvirt_err("listing storage pools"))?;
    let mut out = Vec::new();
    for p in pools {
        let name = p.get_name().map_err(libvirt_err("reading pool name"))?;
        let xml = p.get_xml_desc(0).map_err(libvirt_err("reading pool XML"))?;
        out.push(Pool {
            name,
            path: pool_path_from_xml(&xml),
            active: p.is_active().unwrap_or(false),
        });
    }
    Ok(out)
}

fn list_networks(conn: &Connect) -> Result<Vec<Network>, RomulusError> {
    let nets = conn.list_all_networks(0).map_err(libvirt_err("listing networks"))?;
    let mut out = Vec::new();
    for n in nets {
        let name = n.get_name().map_err(libvirt_err("reading network name"))?;
        let xml = n.get_xml_desc(0).map_err(libvirt_err("reading network XML"))?;
        let mode = if xml.contains("mode=\"nat\"") || xml.contains("mode='nat'") {
            crate::state::NetworkMode::Nat
        } else if xml.contains("mode=\"route\"") || xml.contains("mode='route'") {
            crate::state::NetworkMode::Route
        } else {
            crate::state::NetworkMode::Isolated
        };
        let address = scrape_attr(&xml, "ip", "address").unwrap_or_default();
        let netmask = scrape_attr(&xml, "ip", "netmask").unwrap_or_default();
        let cidr = format!("{address}/{}", netmask_to_prefix(&netmask));
        out.push(Network {
            name,
            mode,
            cidr,
            dhcp: xml.contains("<dhcp>"),
            dns: !xml.contains("<dns enable=\"no\"/>"),
            active: n.is_active().unwrap_or(false),
        });
    }
    Ok(out)
}

fn netmask_to_prefix(netmask: &str) -> u8 {
    let octets: Vec<u32> = netmask.split('.').filter_map(|o| o.parse().ok()).collect();
    if octets.len() != 4 {
        return 24;
    }
    let bits = (octets[0] << 24) | (octets[1] << 16) | (octets[2] << 8) | octets[3];
    bits.count_ones() as u8
}

fn list_volumes(conn: &Connect, pool: &Pool) -> Result<Vec<Volume>, RomulusError> {
    let sp = StoragePool::lookup_by_name(conn, &pool.name).map_err(libvirt_err("looking up pool"))?;
    let vols = sp.list_all_volumes(0).map_err(libvirt_err("listing volumes"))?;
    let mut out = Vec::new();
    for v in vols {
        let name = v.get_name().map_err(libvirt_err("reading volume name"))?;
        let xml = v.get_xml_desc(0).map_err(libvirt_err("reading volume XML"))?;
        let info = v.get_info().map_err(libvirt_err("reading volume info"))?;
        let format_type = scrape_attr(&xml, "format", "type").unwrap_or_default();
        let format = match format_type.as_str() {
            "raw" if name.ends_with(".iso") => VolumeFormat::Iso,
            "raw" => VolumeFormat::Raw,
            _ => VolumeFormat::Qcow2,
        };
        let backing_volume = scrape_text(&xml, "backingStore")
            .and_then(|section| scrape_text(&section, "path"))
            .and_then(|path| path.rsplit('/').next().map(String::from));
        out.push(Volume {
            pool: pool.name.clone(),
            name,
            format,
            capacity_bytes: info.capacity,
            source_url: None,
            backing_volume,
        });
    }
    Ok(out)
}

/// Every DHCP host reservation in `network`'s config, keyed by MAC — the
/// only place a domain's static IP is recorded once it leaves the desired
/// state, since `static_ip` is not part of libvirt's domain schema.
fn dhcp_reservations(xml: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<host ") {
        let end = rest[start..].find("/>").map(|i| start + i).unwrap_or(rest.len());
        let tag = &rest[start..end];
        if let (Some(mac), Some(ip)) =
            (scrape_attr_inline(tag, "mac"), scrape_attr_inline(tag, "ip"))
        {
            out.push((mac.to_lowercase(), ip));
        }
        rest = &rest[end..];
    }
    out
}

fn scrape_attr_inline(tag: &str, attr: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let prefix = format!("{attr}={quote}");
        if let Some(i) = tag.find(&prefix) {
            let start = i + prefix.len();
            if let Some(end) = tag[start..].find(quote) {
                return Some(tag[start..start + end].to_string());
            }
        }
    }
    None
}

fn list_domains(conn: &Connect, networks: &[(String, Vec<(String, String)>)]) -> Result<Vec<Domain>, RomulusError> {
    let doms = conn.list_all_domains(0).map_err(libvirt_err("listing domains"))?;
    let mut out = Vec::new();
    for d in doms {
        let name = d.get_name().map_err(libvirt_err("reading domain name"))?;
        let xml = d.get_xml_desc(0).map_err(libvirt_err("reading domain XML"))?;

        let memory_mib = scrape_text(&xml, "memory")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(0);
        let vcpus = scrape_text(&xml, "vcpu").and_then(|s| s.trim().parse::<u32>().ok()).unwrap_or(1);
        let network = scrape_attr(&xml, "source", "network").unwrap_or_default();
        let mac_address = scrape_attr(&xml, "mac", "address").unwrap_or_default().to_lowercase();

        let disk_files: Vec<String> = {
            let mut files = Vec::new();
            let mut rest = xml.as_str();
            while let Some(start) = rest.find("<source file=") {
                if let Some(path) = scrape_attr_inline(&rest[start..start + 200.min(rest.len() - start)], "file") {
                    files.push(path.rsplit('/').next().unwrap_or(&path).to_string());
                }
                rest = &rest[start + 10..];
            }
            files
        };
        let disk_volume = disk_files.iter().find(|f| !f.ends_with(".iso")).cloned().unwrap_or_default();
        let cloudinit_volume = disk_files.iter().find(|f| f.ends_with(".iso")).cloned().unwrap_or_default();

        let static_ip = networks
            .iter()
            .find(|(net_name, _)| net_name == &network)
            .and_then(|(_, hosts)| hosts.iter().find(|(mac, _)| *mac == mac_address))
            .map(|(_, ip)| ip.clone())
            .unwrap_or_default();

        let (role, index) = crate::util::parse_node_name(&name);

        out.push(Domain {
            name,
            memory_mib,
            vcpus,
            disk_volume,
            cloudinit_volume,
            network,
            mac_address,
            static_ip,
            role,
            index,
        });
    }
    Ok(out)
}

impl HypervisorAdapter for LibvirtAdapter {
    async fn current_state(&self) -> Result<State, RomulusError> {
        let conn = connect(&self.uri)?;

        let pools = list_pools(&conn)?;
        let networks = list_networks(&conn)?;

        let mut volumes = Vec::new();
        for p in &pools {
            volumes.extend(list_volumes(&conn, p)?);
        }

        let net_hosts: Vec<(String, Vec<(String, String)>)> = {
            let nets = conn.list_all_networks(0).map_err(libvirt_err("listing networks"))?;
            let mut out = Vec::new();
            for n in nets {
                let name = n.get_name().map_err(libvirt_err("reading network name"))?;
                let xml = n.get_xml_desc(0).map_err(libvirt_err("reading network XML"))?;
                out.push((name, dhcp_reservations(&xml)));
            }
            out
        };
        let domains = list_domains(&conn, &net_hosts)?;

        Ok(State { networks, pools, volumes, domains })
    }

    async fn create_pool(&self, pool: &Pool) -> Result<(), RomulusError> {
        let conn = connect(&self.uri)?;
        tokio::fs::create_dir_all(&pool.path).await.map_err(|e| RomulusError::Io {
            context: format!("creating pool directory {}", pool.path),
            source: e,
        })?;
        let xml = pool_xml::generate_pool_xml(pool);
        let sp = StoragePool::define_xml(&conn, &xml, 0).map_err(libvirt_err("defining storage pool"))?;
        sp.build(0).map_err(libvirt_err("building storage pool"))?;
        sp.create(0).map_err(libvirt_err("starting storage pool"))?;
        tracing::info!(pool = %pool.name, "storage pool created");
        Ok(())
    }

    async fn destroy_pool(&self, pool: &Pool) -> Result<(), RomulusError> {
        let conn = connect(&self.uri)?;
        let sp =
            StoragePool::lookup_by_name(&conn, &pool.name).map_err(libvirt_err("looking up storage pool"))?;
        if sp.is_active().unwrap_or(false) {
            sp.destroy().map_err(libvirt_err("stopping storage pool"))?;
        }
        sp.undefine().map_err(libvirt_err("undefining storage pool"))?;
        tracing::info!(pool = %pool.name, "storage pool destroyed");
        Ok(())
    }

    async fn create_network(&self, network: &Network) -> Result<(), RomulusError> {
        let conn = connect(&self.uri)?;
        let xml = network_xml::generate_network_xml(network)?;
        let net = VirNetwork::define_xml(&conn, &xml).map_err(libvirt_err("defining network"))?;
        net.create().map_err(libvirt_err("starting network"))?;
        tracing::info!(network = %network.name, "network created");
        Ok(())
    }

    async fn destroy_network(&self, network: &Network) -> Result<(), RomulusError> {
        let conn = connect(&self.uri)?;
        let net =
            VirNetwork::lookup_by_name(&conn, &network.name).map_err(libvirt_err("looking up network"))?;
        if net.is_active().unwrap_or(false) {
            net.destroy().map_err(libvirt_err("stopping network"))?;
        }
        net.undefine().map_err(libvirt_err("undefining network"))?;
        tracing::info!(network = %network.name, "network destroyed");
        Ok(())
    }

    async fn create_disk_volume(&self, volume: &Volume) -> Result<(), RomulusError> {
        let conn = connect(&self.uri)?;
        let sp = StoragePool::lookup_by_name(&conn, &volume.pool).map_err(libvirt_err("looking up pool"))?;
        let pool_xml = sp.get_xml_desc(0).map_err(libvirt_err("reading pool XML"))?;
        let pool_path = pool_path_from_xml(&pool_xml);
        let dest = paths::volume_path(&pool_path, &volume.name);

        let backing_path = if let Some(url) = &volume.source_url {
            let cached = image::ensure_base_image(url, &paths::cache_dir()).await?;
            tokio::fs::copy(&cached, &dest).await.map_err(|e| RomulusError::Io {
                context: format!("copying base image to {}", dest.display()),
                source: e,
            })?;
            None
        } else if let Some(backing_name) = &volume.backing_volume {
            let backing_path = paths::volume_path(&pool_path, backing_name);
            overlay::create_overlay(&backing_path, &dest).await?;
            Some(backing_path.to_string_lossy().into_owned())
        } else {
            qcow2::create_qcow2(&dest, volume.capacity_bytes)?;
            None
        };

        let xml = volume_xml::generate_volume_xml(volume, backing_path.as_deref());
        StorageVol::create_xml(&sp, &xml, 0).map_err(libvirt_err("defining storage volume"))?;
        tracing::info!(volume = %volume.name, pool = %volume.pool, "disk volume created");
        Ok(())
    }

    async fn create_cloudinit_volume(
        &self,
        volume: &Volume,
        iso_bytes: Vec<u8>,
    ) -> Result<(), RomulusError> {
        let conn = connect(&self.uri)?;
        let sp = StoragePool::lookup_by_name(&conn, &volume.pool).map_err(libvirt_err("looking up pool"))?;
        let pool_xml = sp.get_xml_desc(0).map_err(libvirt_err("reading pool XML"))?;
        let pool_path = pool_path_from_xml(&pool_xml);
        let dest = paths::volume_path(&pool_path, &volume.name);

        tokio::fs::write(&dest, &iso_bytes).await.map_err(|e| RomulusError::Io {
            context: format!("writing cloud-init ISO to {}", dest.display()),
            source: e,
        })?;

        let mut sized = volume.clone();
        sized.capacity_bytes = iso_bytes.len() as u64;
        let xml = volume_xml::generate_volume_xml(&sized, None);
        StorageVol::create_xml(&sp, &xml, 0).map_err(libvirt_err("defining cloud-init volume"))?;
        tracing::info!(volume = %volume.name, pool = %volume.pool, "cloud-init volume created");
        Ok(())
    }

    async fn destroy_volume(&self, volume: &Volume) -> Result<(), RomulusError> {
        let conn = connect(&self.uri)?;
        let sp = StoragePool::lookup_by_name(&conn, &volume.pool).map_err(libvirt_err("looking up pool"))?;
        let vol = sp.lookup_volume_by_name(&volume.name).map_err(libvirt_err("looking up volume"))?;
        vol.delete(0).map_err(libvirt_err("deleting volume"))?;
        tracing::info!(volume = %volume.name, pool = %volume.pool, "volume destroyed");
        Ok(())
    }

    async fn create_domain(&self, domain: &Domain) -> Result<(), RomulusError> {
        let conn = connect(&self.uri)?;
        let sp_name = lookup_pool_for_domain(&conn, domain)?;
        let sp = StoragePool::lookup_by_name(&conn, &sp_name).map_err(libvirt_err("looking up pool"))?;
        let pool_xml = sp.get_xml_desc(0).map_err(libvirt_err("reading pool XML"))?;
        let pool_path = pool_path_from_xml(&pool_xml);

        let disk_path = paths::volume_path(&pool_path, &domain.disk_volume);
        let cloudinit_path = paths::volume_path(&pool_path, &domain.cloudinit_volume);
        let xml = domain_xml::generate_domain_xml(
            domain,
            &disk_path.to_string_lossy(),
            &cloudinit_path.to_string_lossy(),
        );
        VirDomain::define_xml(&conn, &xml).map_err(libvirt_err("defining domain"))?;
        let dom = VirDomain::lookup_by_name(&conn, &domain.name).map_err(libvirt_err("looking up domain"))?;
        dom.create().map_err(libvirt_err("starting domain"))?;
        tracing::info!(domain = %domain.name, "domain created");
        Ok(())
    }

    async fn destroy_domain(&self, domain: &Domain) -> Result<(), RomulusError> {
        let conn = connect(&self.uri)?;
        let dom =
            VirDomain::lookup_by_name(&conn, &domain.name).map_err(libvirt_err("looking up domain"))?;
        if dom.is_active().unwrap_or(false) {
            dom.destroy().map_err(libvirt_err("stopping domain"))?;
        }
        dom.undefine().map_err(libvirt_err("undefining domain"))?;
        tracing::info!(domain = %domain.name, "domain destroyed");
        Ok(())
    }
}

/// The only storage pool this domain's volumes could live in is whichever
/// one currently holds its disk volume — there is exactly one pool in any
/// config this crate projects, so the first pool is always it.
fn lookup_pool_for_domain(conn: &Connect, _domain: &Domain) -> Result<String, RomulusError> {
    let pools = conn.list_all_storage_pools(0).map_err(libvirt_err("listing storage pools"))?;
    pools
        .first()
        .map(|p| p.get_name().unwrap_or_default())
        .ok_or_else(|| RomulusError::Libvirt {
            message: "no storage pool defined".into(),
            hint: "run `romulus apply` to create the storage pool first".into(),
        })
}
