//! Libvirt storage volume XML generation using facet-xml struct serialization.

use facet::Facet;
use facet_xml as xml;

use crate::state::{Volume, VolumeFormat};

#[derive(Debug, Facet)]
#[facet(rename = "volume")]
struct VolumeDef {
    name: String,
    capacity: Capacity,
    target: VolumeTarget,
    #[facet(default)]
    #[facet(rename = "backingStore")]
    backing_store: Option<BackingStore>,
}

#[derive(Debug, Facet)]
struct Capacity {
    #[facet(xml::attribute)]
    unit: String,
    #[facet(xml::text)]
    value: u64,
}

#[derive(Debug, Facet)]
struct VolumeTarget {
    format: Format,
}

#[derive(Debug, Facet)]
struct Format {
    #[facet(xml::attribute, rename = "type")]
    format_type: String,
}

#[derive(Debug, Facet)]
struct BackingStore {
    path: BackingPath,
    format: Format,
}

#[derive(Debug, Facet)]
#[facet(rename = "path")]
struct BackingPath {
    #[facet(xml::text)]
    value: String,
}

fn format_name(format: VolumeFormat) -> &'static str {
    match format {
        VolumeFormat::Qcow2 => "qcow2",
        VolumeFormat::Raw => "raw",
        VolumeFormat::Iso => "raw",
    }
}

/// Generate libvirt storage volume XML. `backing_path` is the absolute path
/// of the volume named in `volume.backing_volume`, resolved by the caller
/// from the owning pool (the libvirt volume schema wants a path, not a name).
pub fn generate_volume_xml(volume: &Volume, backing_path: Option<&str>) -> String {
    let backing_store = backing_path.map(|path| BackingStore {
        path: BackingPath { value: path.to_string() },
        format: Format { format_type: format_name(VolumeFormat::Qcow2).into() },
    });

    let def = VolumeDef {
        name: volume.name.clone(),
        capacity: Capacity { unit: "bytes".into(), value: volume.capacity_bytes },
        target: VolumeTarget { format: Format { format_type: format_name(volume.format).into() } },
        backing_store,
    };

    facet_xml::to_string(&def).expect("volume XML serialization should not fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk() -> Volume {
        Volume {
            pool: "p".into(),
            name: "k8s-master-1-disk".into(),
            format: VolumeFormat::Qcow2,
            capacity_bytes: 20 * 1024 * 1024 * 1024,
            source_url: None,
            backing_volume: Some("base".into()),
        }
    }

    #[test]
    fn volume_xml_has_capacity_and_format() {
        let xml = generate_volume_xml(&disk(), None);
        assert!(xml.contains("<name>k8s-master-1-disk</name>"));
        assert!(xml.contains(r#"unit="bytes""#));
        assert!(xml.contains(&(20u64 * 1024 * 1024 * 1024).to_string()));
        assert!(xml.contains(r#"type="qcow2""#));
    }

    #[test]
    fn volume_xml_with_backing_store() {
        let xml = generate_volume_xml(&disk(), Some("/var/lib/romulus/p/base.qcow2"));
        assert!(xml.contains("backingStore"));
        assert!(xml.contains("/var/lib/romulus/p/base.qcow2"));
    }

    #[test]
    fn iso_volume_has_no_backing_store() {
        let iso = Volume {
            pool: "p".into(),
            name: "k8s-master-1-init.iso".into(),
            format: VolumeFormat::Iso,
            capacity_bytes: 0,
            source_url: None,
            backing_volume: None,
        };
        let xml = generate_volume_xml(&iso, None);
        assert!(!xml.contains("backingStore"));
        assert!(xml.contains(r#"type="raw""#));
    }
}
