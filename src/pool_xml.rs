//! Libvirt storage pool XML generation using facet-xml struct serialization.

use facet::Facet;
use facet_xml as xml;

use crate::state::Pool;

#[derive(Debug, Facet)]
#[facet(rename = "pool")]
struct PoolDef {
    #[facet(xml::attribute, rename = "type")]
    pool_type: String,
    name: String,
    target: PoolTarget,
}

#[derive(Debug, Facet)]
struct PoolTarget {
    path: Path,
}

#[derive(Debug, Facet)]
#[facet(rename = "path")]
struct Path {
    #[facet(xml::text)]
    value: String,
}

/// Generate libvirt storage pool XML for a directory-backed pool.
pub fn generate_pool_xml(pool: &Pool) -> String {
    let def = PoolDef {
        pool_type: "dir".into(),
        name: pool.name.clone(),
        target: PoolTarget { path: Path { value: pool.path.clone() } },
    };
    facet_xml::to_string(&def).expect("pool XML serialization should not fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_xml_has_name_and_path() {
        let pool = Pool { name: "romulus-pool".into(), path: "/var/lib/romulus/pool".into(), active: true };
        let xml = generate_pool_xml(&pool);
        assert!(xml.contains(r#"type="dir""#));
        assert!(xml.contains("<name>romulus-pool</name>"));
        assert!(xml.contains("<path>/var/lib/romulus/pool</path>"));
    }
}
