//! Command-line behaviour of the `vmprep` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn vmprep(data_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("vmprep").unwrap();
    cmd.env("VMPREP_DATA_HOME", data_home.path())
        .env_remove("VMPREP_PROVIDER")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn providers_lists_host_default() {
    let home = TempDir::new().unwrap();
    vmprep(&home)
        .args(["providers", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"default\": true"));
}

#[test]
fn unknown_provider_is_rejected_with_hint() {
    let home = TempDir::new().unwrap();
    vmprep(&home)
        .args(["--provider", "virtualbox", "preflight"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("virtualbox"))
        .stderr(predicate::str::contains("vmprep providers"));
}

#[test]
fn invalid_machine_name_is_rejected() {
    let home = TempDir::new().unwrap();
    let image = home.path().join("disk.raw");
    std::fs::write(&image, b"raw").unwrap();

    vmprep(&home)
        .args(["pull", "--skip-preflight", "--name", "bad name"])
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains("bad name"));
}

#[cfg(target_os = "linux")]
#[test]
fn pull_places_image_in_data_dir() {
    let home = TempDir::new().unwrap();
    let image = home.path().join("disk.raw");
    let data = vmprep_testing::pseudo_random_bytes(3 * 1024 * 1024, 21);
    std::fs::write(&image, &data).unwrap();

    vmprep(&home)
        .args(["pull", "--skip-preflight", "--name", "dev", "--format", "json"])
        .arg(&image)
        .assert()
        .success()
        .stdout(predicate::str::contains("dev-qemu.raw"))
        .stdout(predicate::str::contains("\"outcome\": \"copied\""));

    let placed = home
        .path()
        .join("containers/vmprep/machine/qemu/dev-qemu.raw");
    assert_eq!(std::fs::read(placed).unwrap(), data);
}

#[cfg(target_os = "linux")]
#[test]
fn pull_rejects_wrong_extension() {
    let home = TempDir::new().unwrap();
    let image = home.path().join("disk.iso");
    std::fs::write(&image, b"iso").unwrap();

    vmprep(&home)
        .args(["pull", "--skip-preflight"])
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains(".qcow2 and .raw"));
}
