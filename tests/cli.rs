mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use support::StubVault;
use tempfile::tempdir;

fn bin() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("signergen"));
    cmd.env_remove("SIGNERGEN_OUTPUT")
        .env_remove("SIGNERGEN_PASSWORD")
        .env_remove("SIGNERGEN_VAULT_TOKEN");
    cmd
}

fn count_with_extension(dir: &Path, ext: &str) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter(|e| {
            e.as_ref()
                .unwrap()
                .path()
                .extension()
                .is_some_and(|x| x == ext)
        })
        .count()
}

#[test]
fn raw_writes_one_descriptor_per_key() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("keys");

    bin()
        .arg("--output")
        .arg(&out)
        .arg("--count")
        .arg("50")
        .arg("raw")
        .assert()
        .success()
        .stdout(predicate::str::contains("raw: requested 50, succeeded 50"));

    assert_eq!(count_with_extension(&out, "yaml"), 50);
}

#[test]
fn output_dir_from_env() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("from-env");

    bin()
        .env("SIGNERGEN_OUTPUT", &out)
        .args(["raw", "--count", "2"])
        .assert()
        .success();

    assert_eq!(count_with_extension(&out, "yaml"), 2);
}

#[test]
fn keystores_with_env_password() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("keys");

    bin()
        .env("SIGNERGEN_PASSWORD", "pw")
        .arg("--output")
        .arg(&out)
        .args(["--count", "2", "keystores", "--kdf-iterations", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("descriptors written 2"));

    assert_eq!(count_with_extension(&out, "json"), 2);
    assert_eq!(count_with_extension(&out, "password"), 2);
    assert_eq!(count_with_extension(&out, "yaml"), 2);
}

#[test]
fn keystores_with_piped_password() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("keys");

    bin()
        .arg("--output")
        .arg(&out)
        .args(["--count", "1", "keystores", "--kdf-iterations", "1"])
        .arg("--config-dir")
        .arg("/var/config/keys")
        .write_stdin("piped\n")
        .assert()
        .success();

    let password = fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().is_some_and(|x| x == "password"))
        .unwrap();
    assert_eq!(fs::read_to_string(password).unwrap(), "piped");
}

#[test]
fn zero_count_is_rejected() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("keys");

    bin()
        .arg("--output")
        .arg(&out)
        .args(["--count", "0", "raw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("positive"));

    assert!(!out.exists());
}

#[test]
fn zero_kdf_iterations_is_rejected() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("keys");

    bin()
        .env("SIGNERGEN_PASSWORD", "pw")
        .arg("--output")
        .arg(&out)
        .args(["--count", "1", "keystores", "--kdf-iterations", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("iteration count"));

    assert!(!out.exists());
}

#[test]
fn hashicorp_requires_a_token() {
    let dir = tempdir().unwrap();

    bin()
        .arg("--output")
        .arg(dir.path().join("keys"))
        .args(["hashicorp", "--url", "http://127.0.0.1:9/v1/secret"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("token is required"));
}

#[test]
fn hashicorp_store_not_ready_fails_without_files() {
    let stub = StubVault::start(503, 200, None);
    let dir = tempdir().unwrap();
    let out = dir.path().join("keys");

    bin()
        .arg("--output")
        .arg(&out)
        .args(["--count", "3", "hashicorp", "--token", "root", "--url"])
        .arg(stub.url())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized or unreachable"));

    assert!(!out.exists());
    assert!(stub.posts().is_empty());
}

#[test]
fn hashicorp_with_token_file() {
    let stub = StubVault::ready();
    let dir = tempdir().unwrap();
    let out = dir.path().join("keys");
    let token = dir.path().join("token");
    fs::write(&token, "s.file-token\n").unwrap();

    bin()
        .arg("--output")
        .arg(&out)
        .args(["--count", "2", "hashicorp", "--url"])
        .arg(stub.url())
        .arg("--token-file")
        .arg(&token)
        .assert()
        .success()
        .stdout(predicate::str::contains("hashicorp: requested 2, succeeded 2"));

    assert_eq!(count_with_extension(&out, "yaml"), 2);

    let posts = stub.posts();
    assert_eq!(posts.len(), 2);
    assert!(posts.iter().all(|p| p.header("x-vault-token") == Some("s.file-token")));
}

#[test]
fn hashicorp_partial_failure_still_succeeds() {
    let stub = StubVault::start(200, 200, Some(1));
    let dir = tempdir().unwrap();
    let out = dir.path().join("keys");

    bin()
        .env("SIGNERGEN_VAULT_TOKEN", "root")
        .arg("--output")
        .arg(&out)
        .args(["--count", "3", "hashicorp", "--url"])
        .arg(stub.url())
        .assert()
        .success()
        .stdout(predicate::str::contains("succeeded 2, failed 1"));

    assert_eq!(count_with_extension(&out, "yaml"), 2);
}

#[test]
fn keystores_reject_control_only_password() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("keys");

    bin()
        .env("SIGNERGEN_PASSWORD", "\t\t")
        .arg("--output")
        .arg(&out)
        .args(["--count", "1", "keystores", "--kdf-iterations", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("empty after normalization"));

    assert!(!out.exists());
}

#[test]
fn hashicorp_rejects_query_in_url() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("keys");

    bin()
        .arg("--output")
        .arg(&out)
        .args([
            "hashicorp",
            "--token",
            "root",
            "--url",
            "http://127.0.0.1:9/v1/secret?version=2",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("query or fragment"));

    assert!(!out.exists());
}

#[test]
fn ethsigner_writes_wallet_password_and_config() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("keys");

    bin()
        .env("SIGNERGEN_PASSWORD", "pw")
        .arg("--output")
        .arg(&out)
        .args(["--count", "2", "ethsigner", "--scrypt-log-n", "2"])
        .arg("--override-path-in-config")
        .arg("/var/config/eth")
        .assert()
        .success()
        .stdout(predicate::str::contains("ethsigner: requested 2, succeeded 2"));

    assert_eq!(count_with_extension(&out, "json"), 2);
    assert_eq!(count_with_extension(&out, "password"), 2);
    assert_eq!(count_with_extension(&out, "toml"), 2);

    let config = fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().is_some_and(|x| x == "toml"))
        .unwrap();
    let address = config.file_stem().unwrap().to_string_lossy().into_owned();
    assert_eq!(address.len(), 40);

    let text = fs::read_to_string(&config).unwrap();
    assert!(text.contains("file-based-signer"));
    assert!(text.contains(&format!("/var/config/eth/{address}.json")));

    let wallet: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join(format!("{address}.json"))).unwrap())
            .unwrap();
    assert_eq!(wallet["version"], 3);
    assert_eq!(wallet["address"], address.as_str());
}

#[test]
fn ethsigner_zero_scrypt_cost_is_rejected() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("keys");

    bin()
        .env("SIGNERGEN_PASSWORD", "pw")
        .arg("--output")
        .arg(&out)
        .args(["--count", "1", "ethsigner", "--scrypt-log-n", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("scrypt"));

    assert!(!out.exists());
}
