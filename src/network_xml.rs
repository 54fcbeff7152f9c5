//! Libvirt network XML generation using facet-xml struct serialization.

use facet::Facet;
use facet_xml as xml;

use crate::error::RomulusError;
use crate::state::{Network, NetworkMode};

#[derive(Debug, Facet)]
#[facet(rename = "network")]
struct NetworkDef {
    name: String,
    #[facet(default)]
    forward: Option<Forward>,
    ip: NetworkIp,
}

#[derive(Debug, Facet)]
struct Forward {
    #[facet(xml::attribute)]
    mode: String,
}

#[derive(Debug, Facet)]
struct NetworkIp {
    #[facet(xml::attribute)]
    address: String,
    #[facet(xml::attribute)]
    netmask: String,
    #[facet(default)]
    dhcp: Option<NetworkDhcp>,
}

#[derive(Debug, Facet)]
struct NetworkDhcp {
    range: DhcpRange,
}

#[derive(Debug, Facet)]
struct DhcpRange {
    #[facet(xml::attribute)]
    start: String,
    #[facet(xml::attribute)]
    end: String,
}

/// Generate libvirt network XML from a [`Network`] resource.
///
/// `Isolated` networks omit `<forward>` entirely; `Nat`/`Route` set the
/// matching forward mode. The gateway takes the first host address in the
/// CIDR; a DHCP range spans from `.100` to one below the broadcast address
/// when `network.dhcp` is set.
pub fn generate_network_xml(network: &Network) -> Result<String, RomulusError> {
    let (base, prefix_len) = parse_cidr(&network.cidr)?;
    let mask = mask_for_prefix(prefix_len);
    let network_addr = base & mask;
    let broadcast = network_addr | !mask;
    let gateway = network_addr | 1;

    let forward = match network.mode {
        NetworkMode::Isolated => None,
        NetworkMode::Nat => Some(Forward { mode: "nat".into() }),
        NetworkMode::Route => Some(Forward { mode: "route".into() }),
    };

    let dhcp = if network.dhcp {
        Some(NetworkDhcp {
            range: DhcpRange {
                start: octets(network_addr | 100),
                end: octets(broadcast.saturating_sub(1)),
            },
        })
    } else {
        None
    };

    let def = NetworkDef {
        name: network.name.clone(),
        forward,
        ip: NetworkIp { address: octets(gateway), netmask: octets(mask), dhcp },
    };

    Ok(facet_xml::to_string(&def).expect("network XML serialization should not fail"))
}

fn parse_cidr(cidr: &str) -> Result<(u32, u8), RomulusError> {
    let (addr, prefix_len) = cidr.split_once('/').ok_or_else(|| RomulusError::Validation {
        message: format!("network cidr must be IPv4 CIDR (got '{cidr}')"),
    })?;
    let prefix_len: u8 = prefix_len.parse().map_err(|_| RomulusError::Validation {
        message: format!("network cidr prefix is not a number: '{cidr}'"),
    })?;
    if prefix_len > 32 {
        return Err(RomulusError::Validation { message: format!("network cidr prefix out of range: '{cidr}'") });
    }
    let parts: Vec<u32> = addr
        .split('.')
        .map(|o| o.parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| RomulusError::Validation { message: format!("network cidr address is invalid: '{cidr}'") })?;
    if parts.len() != 4 {
        return Err(RomulusError::Validation { message: format!("network cidr address is invalid: '{cidr}'") });
    }
    let base = (parts[0] << 24) | (parts[1] << 16) | (parts[2] << 8) | parts[3];
    Ok((base, prefix_len))
}

fn mask_for_prefix(prefix_len: u8) -> u32 {
    if prefix_len == 0 { 0 } else { u32::MAX << (32 - prefix_len) }
}

fn octets(addr: u32) -> String {
    format!(
        "{}.{}.{}.{}",
        (addr >> 24) & 0xff,
        (addr >> 16) & 0xff,
        (addr >> 8) & 0xff,
        addr & 0xff
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(mode: NetworkMode, dhcp: bool) -> Network {
        Network { name: "k8s-net".into(), mode, cidr: "192.168.100.0/24".into(), dhcp, dns: true, active: true }
    }

    #[test]
    fn nat_network_has_forward_and_dhcp() {
        let xml = generate_network_xml(&network(NetworkMode::Nat, true)).unwrap();
        assert!(xml.contains("<name>k8s-net</name>"));
        assert!(xml.contains(r#"mode="nat""#));
        assert!(xml.contains(r#"address="192.168.100.1""#));
        assert!(xml.contains(r#"netmask="255.255.255.0""#));
        assert!(xml.contains(r#"start="192.168.100.100""#));
        assert!(xml.contains(r#"end="192.168.100.254""#));
    }

    #[test]
    fn isolated_network_has_no_forward() {
        let xml = generate_network_xml(&network(NetworkMode::Isolated, true)).unwrap();
        assert!(!xml.contains("forward"));
    }

    #[test]
    fn dhcp_disabled_omits_range() {
        let xml = generate_network_xml(&network(NetworkMode::Nat, false)).unwrap();
        assert!(!xml.contains("<dhcp>"));
    }

    #[test]
    fn rejects_malformed_cidr() {
        let mut n = network(NetworkMode::Nat, true);
        n.cidr = "not-a-cidr".into();
        assert!(generate_network_xml(&n).is_err());
    }
}
