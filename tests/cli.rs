use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

fn romulus() -> assert_cmd::Command {
    cargo_bin_cmd!("romulus").into()
}

#[test]
fn help_works() {
    romulus()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("libvirt/KVM"));
}

#[test]
fn init_scaffolds_a_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("romulus.yaml");

    romulus()
        .args(["--config", config_path.to_str().unwrap(), "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote"));

    assert!(config_path.exists());
}

#[test]
fn init_refuses_to_overwrite_an_existing_config() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("romulus.yaml");
    std::fs::write(&config_path, "cluster:\n  name: x\n").unwrap();

    romulus()
        .args(["--config", config_path.to_str().unwrap(), "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn plan_with_missing_config_shows_error() {
    romulus()
        .args(["--config", "/nonexistent/romulus.yaml", "plan"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn plan_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("romulus.yaml");
    std::fs::write(
        &config_path,
        r#"
cluster:
  name: test
  domain: cluster.local

network:
  name: test-net
  mode: nat
  cidr: 192.168.100.0/24
  dhcp: true
  dns: true

storage:
  pool_name: test-pool
  pool_path: /var/lib/romulus/pool
  base_image:
    name: base
    url: https://example.invalid/base.img
    format: qcow2

nodes:
  masters:
    count: 0
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
"#,
    )
    .unwrap();

    romulus()
        .args(["--config", config_path.to_str().unwrap(), "plan"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("invalid config"));
}

#[test]
fn render_cloudinit_rejects_unknown_domain() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("romulus.yaml");

    romulus()
        .args(["--config", config_path.to_str().unwrap(), "init"])
        .assert()
        .success();

    romulus()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "render-cloudinit",
            "no-such-domain",
        ])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no domain named"));
}

#[test]
fn bootstrap_k8s_rejects_missing_script() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("romulus.yaml");

    romulus()
        .args(["--config", config_path.to_str().unwrap(), "init"])
        .assert()
        .success();

    romulus()
        .args([
            "--config",
            config_path.to_str().unwrap(),
            "bootstrap-k8s",
            "--script",
            dir.path().join("no-such-script.sh").to_str().unwrap(),
        ])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("reading bootstrap script"));
}
