//! Literal `${name}` template substitution for cloud-init NoCloud seed data,
//! plus the ISO9660 packaging of the result.
//!
//! Unlike the rest of this crate's YAML handling, templates are substituted
//! as plain text first and parsed as YAML only to validate the result —
//! `facet_yaml` never builds the document, since the whole point of a
//! literal substitution engine is that operators can hand-author templates
//! without learning this crate's data model.

use std::collections::HashMap;

use facet_value::Value;

use crate::error::RomulusError;
use crate::iso9660::{self, IsoFile};
use crate::state::{Domain, Role};

pub const MASTER_USER_DATA_TEMPLATE: &str = "\
#cloud-config
hostname: ${hostname}
manage_etc_hosts: true
users:
  - name: ubuntu
    ssh_authorized_keys:
      - ${ssh_key}
    sudo: ALL=(ALL) NOPASSWD:ALL
    shell: /bin/bash
write_files:
  - path: /etc/romulus/node-role
    content: master
runcmd:
  - [ sh, -c, \"echo ${node_ip} > /etc/romulus/node-ip\" ]
";

pub const WORKER_USER_DATA_TEMPLATE: &str = "\
#cloud-config
hostname: ${hostname}
manage_etc_hosts: true
users:
  - name: ubuntu
    ssh_authorized_keys:
      - ${ssh_key}
    sudo: ALL=(ALL) NOPASSWD:ALL
    shell: /bin/bash
write_files:
  - path: /etc/romulus/node-role
    content: worker
runcmd:
  - [ sh, -c, \"echo ${node_ip} > /etc/romulus/node-ip\" ]
";

pub const NETWORK_CONFIG_TEMPLATE: &str = "\
version: 2
ethernets:
  id0:
    match:
      name: \"en*\"
    addresses:
      - ${ip_address}/24
";

/// Substitute every `${name}` occurrence in `template` with its value from
/// `vars`. Placeholders with no matching entry are left untouched.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            out.push_str(rest);
            return out;
        };
        let end = start + end;
        let name = &rest[start + 2..end];
        out.push_str(&rest[..start]);
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[start..=end]),
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Return the placeholder names in `template` for which `vars` has no entry.
pub fn validate_template(template: &str, vars: &HashMap<String, String>) -> Vec<String> {
    let mut missing = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else { break };
        let end = start + end;
        let name = &rest[start + 2..end];
        if !vars.contains_key(name) && !missing.iter().any(|m| m == name) {
            missing.push(name.to_string());
        }
        rest = &rest[end + 1..];
    }
    missing
}

/// Render `template` and confirm the result parses as YAML.
fn render_and_validate(
    template: &str,
    vars: &HashMap<String, String>,
    vm: &str,
) -> Result<String, RomulusError> {
    let rendered = render(template, vars);
    facet_yaml::from_str::<Value>(&rendered).map_err(|e| RomulusError::Template {
        vm: vm.into(),
        message: format!("rendered template is not valid YAML: {e}"),
    })?;
    Ok(rendered)
}

/// Build the `{hostname, ssh_key, node_ip, ip_address}` variable map for one
/// domain.
pub fn render_vars(domain: &Domain, ssh_key: &str) -> HashMap<String, String> {
    HashMap::from([
        ("hostname".to_string(), domain.name.clone()),
        ("ssh_key".to_string(), ssh_key.to_string()),
        ("node_ip".to_string(), domain.static_ip.clone()),
        ("ip_address".to_string(), domain.static_ip.clone()),
    ])
}

/// Render the `(meta-data, user-data, network-config)` trio for `domain`,
/// validating that the two substituted templates parse as YAML. Used both
/// to build the seed ISO and by `romulus render-cloudinit` to write the
/// three files out for operator inspection.
pub fn render_files(domain: &Domain, ssh_key: &str) -> Result<(String, String, String), RomulusError> {
    let vars = render_vars(domain, ssh_key);

    let user_data_template = match domain.role {
        Role::Master => MASTER_USER_DATA_TEMPLATE,
        Role::Worker => WORKER_USER_DATA_TEMPLATE,
    };

    let user_data = render_and_validate(user_data_template, &vars, &domain.name)?;
    let network_config = render_and_validate(NETWORK_CONFIG_TEMPLATE, &vars, &domain.name)?;
    let meta_data = format!("instance-id: {name}\nlocal-hostname: {name}\n", name = domain.name);

    Ok((meta_data, user_data, network_config))
}

/// Render user-data and network-config for `domain`, then package both
/// (plus a minimal meta-data) into a NoCloud seed ISO (volume label
/// `CIDATA`).
pub fn build_seed_iso(domain: &Domain, ssh_key: &str) -> Result<Vec<u8>, RomulusError> {
    let (meta_data, user_data, network_config) = render_files(domain, ssh_key)?;

    Ok(iso9660::build_iso(
        "CIDATA",
        &[
            IsoFile { name: "meta-data", data: meta_data.as_bytes() },
            IsoFile { name: "user-data", data: user_data.as_bytes() },
            IsoFile { name: "network-config", data: network_config.as_bytes() },
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(role: Role) -> Domain {
        Domain {
            name: "k8s-master-1".into(),
            memory_mib: 2048,
            vcpus: 2,
            disk_volume: "k8s-master-1-disk".into(),
            cloudinit_volume: "k8s-master-1-init.iso".into(),
            network: "k8s-net".into(),
            mac_address: "52:54:00:ab:cd:ef".into(),
            static_ip: "10.10.10.1".into(),
            role,
            index: 1,
        }
    }

    #[test]
    fn render_substitutes_known_placeholders() {
        let vars = HashMap::from([("name".to_string(), "bob".to_string())]);
        assert_eq!(render("hello ${name}!", &vars), "hello bob!");
    }

    #[test]
    fn render_preserves_unknown_placeholders() {
        let vars = HashMap::new();
        assert_eq!(render("hello ${name}!", &vars), "hello ${name}!");
    }

    #[test]
    fn render_handles_repeated_placeholders() {
        let vars = HashMap::from([("x".to_string(), "1".to_string())]);
        assert_eq!(render("${x}-${x}", &vars), "1-1");
    }

    #[test]
    fn validate_template_lists_missing_names() {
        let vars = HashMap::from([("hostname".to_string(), "h".to_string())]);
        let missing = validate_template("${hostname} ${ssh_key} ${node_ip}", &vars);
        assert_eq!(missing, vec!["ssh_key".to_string(), "node_ip".to_string()]);
    }

    #[test]
    fn validate_template_empty_when_all_present() {
        let vars = HashMap::from([("a".to_string(), "1".to_string())]);
        assert!(validate_template("${a}", &vars).is_empty());
    }

    #[test]
    fn render_vars_covers_required_names() {
        let vars = render_vars(&domain(Role::Master), "ssh-ed25519 AAAA...");
        for name in ["hostname", "ssh_key", "node_ip", "ip_address"] {
            assert!(vars.contains_key(name), "missing var '{name}'");
        }
    }

    #[test]
    fn master_and_worker_templates_render_to_valid_yaml() {
        build_seed_iso(&domain(Role::Master), "ssh-ed25519 AAAA...").unwrap();
        build_seed_iso(&domain(Role::Worker), "ssh-ed25519 AAAA...").unwrap();
    }

    #[test]
    fn render_files_includes_instance_id_in_meta_data() {
        let (meta_data, _, _) = render_files(&domain(Role::Master), "ssh-ed25519 AAAA...").unwrap();
        assert!(meta_data.contains("instance-id: k8s-master-1"));
    }

    #[test]
    fn seed_iso_is_non_empty() {
        let iso = build_seed_iso(&domain(Role::Master), "ssh-ed25519 AAAA...").unwrap();
        assert!(!iso.is_empty());
    }
}
