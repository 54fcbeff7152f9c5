//! Libvirt domain XML generation using facet-xml struct serialization.
//!
//! # Caveats (facet-xml v0.43)
//!
//! - **Compact output only.** Pretty-print (`to_string_pretty`) corrupts text
//!   nodes by inserting whitespace inside `<name>`, `<memory>`, etc.
//!   Tracked upstream: <https://github.com/facet-rs/facet/issues/1982>
//! - **No self-closing tags.** Attribute-only elements like `<boot dev="hd">`
//!   render as `<boot dev="hd"></boot>` instead of `<boot dev="hd"/>`.
//!   Libvirt accepts both forms, so this is cosmetic only.
//! - **`#[facet(flatten)]` is broken** for enum variants — double-wraps
//!   elements. Avoid for now; use separate struct fields instead.

use facet::Facet;
use facet_xml as xml;

use crate::state::Domain as StateDomain;

#[derive(Debug, Facet)]
#[facet(rename = "domain")]
struct Domain {
    #[facet(xml::attribute, rename = "type")]
    domain_type: String,
    name: String,
    memory: Memory,
    vcpu: u32,
    os: Os,
    features: Features,
    devices: Devices,
}

#[derive(Debug, Facet)]
struct Memory {
    #[facet(xml::attribute)]
    unit: String,
    #[facet(xml::text)]
    value: u64,
}

#[derive(Debug, Facet)]
struct Os {
    #[facet(rename = "type")]
    os_type: OsType,
    boot: Boot,
}

#[derive(Debug, Facet)]
#[facet(rename = "type")]
struct OsType {
    #[facet(xml::attribute)]
    arch: String,
    #[facet(xml::attribute)]
    machine: String,
    #[facet(xml::text)]
    value: String,
}

#[derive(Debug, Facet)]
struct Boot {
    #[facet(xml::attribute)]
    dev: String,
}

#[derive(Debug, Facet)]
struct Features {
    acpi: Empty,
    apic: Empty,
}

#[derive(Debug, Default, Facet)]
#[facet(default)]
struct Empty {}

#[derive(Debug, Facet)]
struct Devices {
    disk: Vec<Disk>,
    interface: Interface,
    serial: Serial,
    console: Console,
}

#[derive(Debug, Facet)]
struct Disk {
    #[facet(xml::attribute, rename = "type")]
    disk_type: String,
    #[facet(xml::attribute)]
    device: String,
    driver: DiskDriver,
    source: DiskSource,
    target: DiskTarget,
    #[facet(default)]
    readonly: Option<Empty>,
}

#[derive(Debug, Facet)]
struct DiskDriver {
    #[facet(xml::attribute)]
    name: String,
    #[facet(xml::attribute, rename = "type")]
    driver_type: String,
}

#[derive(Debug, Facet)]
struct DiskSource {
    #[facet(xml::attribute)]
    file: String,
}

#[derive(Debug, Facet)]
struct DiskTarget {
    #[facet(xml::attribute)]
    dev: String,
    #[facet(xml::attribute)]
    bus: String,
}

#[derive(Debug, Facet)]
struct Interface {
    #[facet(xml::attribute, rename = "type")]
    iface_type: String,
    source: InterfaceSource,
    mac: InterfaceMac,
    model: InterfaceModel,
}

#[derive(Debug, Facet)]
struct InterfaceSource {
    #[facet(xml::attribute)]
    network: String,
}

#[derive(Debug, Facet)]
struct InterfaceMac {
    #[facet(xml::attribute)]
    address: String,
}

#[derive(Debug, Facet)]
struct InterfaceModel {
    #[facet(xml::attribute, rename = "type")]
    model_type: String,
}

#[derive(Debug, Facet)]
struct Serial {
    #[facet(xml::attribute, rename = "type")]
    serial_type: String,
    target: SerialTarget,
}

#[derive(Debug, Facet)]
#[facet(rename = "target")]
struct SerialTarget {
    #[facet(xml::attribute)]
    port: String,
}

#[derive(Debug, Facet)]
struct Console {
    #[facet(xml::attribute, rename = "type")]
    console_type: String,
    target: ConsoleTarget,
}

#[derive(Debug, Facet)]
#[facet(rename = "target")]
struct ConsoleTarget {
    #[facet(xml::attribute, rename = "type")]
    target_type: String,
    #[facet(xml::attribute)]
    port: String,
}

/// Generate libvirt domain XML for one cluster node.
///
/// `disk_path` and `cloudinit_path` are the on-disk locations of the
/// domain's two volumes, resolved by the caller from the storage pool.
pub fn generate_domain_xml(domain: &StateDomain, disk_path: &str, cloudinit_path: &str) -> String {
    let xml = Domain {
        domain_type: "kvm".into(),
        name: domain.name.clone(),
        memory: Memory { unit: "MiB".into(), value: domain.memory_mib },
        vcpu: domain.vcpus,
        os: Os {
            os_type: OsType { arch: "x86_64".into(), machine: "q35".into(), value: "hvm".into() },
            boot: Boot { dev: "hd".into() },
        },
        features: Features { acpi: Empty {}, apic: Empty {} },
        devices: Devices {
            disk: vec![
                Disk {
                    disk_type: "file".into(),
                    device: "disk".into(),
                    driver: DiskDriver { name: "qemu".into(), driver_type: "qcow2".into() },
                    source: DiskSource { file: disk_path.to_string() },
                    target: DiskTarget { dev: "vda".into(), bus: "virtio".into() },
                    readonly: None,
                },
                Disk {
                    disk_type: "file".into(),
                    device: "cdrom".into(),
                    driver: DiskDriver { name: "qemu".into(), driver_type: "raw".into() },
                    source: DiskSource { file: cloudinit_path.to_string() },
                    target: DiskTarget { dev: "sda".into(), bus: "sata".into() },
                    readonly: Some(Empty {}),
                },
            ],
            interface: Interface {
                iface_type: "network".into(),
                source: InterfaceSource { network: domain.network.clone() },
                mac: InterfaceMac { address: domain.mac_address.clone() },
                model: InterfaceModel { model_type: "virtio".into() },
            },
            serial: Serial { serial_type: "pty".into(), target: SerialTarget { port: "0".into() } },
            console: Console {
                console_type: "pty".into(),
                target: ConsoleTarget { target_type: "serial".into(), port: "0".into() },
            },
        },
    };

    facet_xml::to_string(&xml).expect("domain XML serialization should not fail")
}

/// Compare freshly generated XML against what was last recorded on disk.
pub fn xml_has_changed(domain: &StateDomain, disk_path: &str, cloudinit_path: &str, existing: &str) -> bool {
    generate_domain_xml(domain, disk_path, cloudinit_path) != existing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Role;

    fn domain() -> StateDomain {
        StateDomain {
            name: "k8s-master-1".into(),
            memory_mib: 2048,
            vcpus: 2,
            disk_volume: "k8s-master-1-disk".into(),
            cloudinit_volume: "k8s-master-1-init.iso".into(),
            network: "k8s-net".into(),
            mac_address: "52:54:00:ab:cd:ef".into(),
            static_ip: "10.10.10.1".into(),
            role: Role::Master,
            index: 1,
        }
    }

    #[test]
    fn xml_contains_expected_attributes() {
        let xml = generate_domain_xml(&domain(), "/var/lib/romulus/p/k8s-master-1-disk", "/var/lib/romulus/p/k8s-master-1-init.iso");
        assert!(xml.contains(r#"type="kvm""#));
        assert!(xml.contains("<name>k8s-master-1</name>"));
        assert!(xml.contains(r#"address="52:54:00:ab:cd:ef""#));
        assert!(xml.contains(r#"network="k8s-net""#));
        assert!(xml.contains("k8s-master-1-disk"));
        assert!(xml.contains("k8s-master-1-init.iso"));
    }

    #[test]
    fn xml_has_changed_detects_memory_edit() {
        let xml = generate_domain_xml(&domain(), "/a", "/b");
        assert!(!xml_has_changed(&domain(), "/a", "/b", &xml));
        let mut bigger = domain();
        bigger.memory_mib = 4096;
        assert!(xml_has_changed(&bigger, "/a", "/b", &xml));
    }
}
