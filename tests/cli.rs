use assert_cmd::Command;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use predicates::prelude::*;
use tempfile::tempdir;

fn cloud_id() -> String {
    format!(
        "deployment:{}",
        STANDARD.encode("eu-west-1.aws.found.io$abc123$kib456")
    )
}

fn loader() -> Command {
    let mut cmd = Command::cargo_bin("stac-loader").expect("Binary exists");
    cmd.env_clear();
    cmd
}

#[test]
fn ingest_without_configuration_fails_and_names_missing_vars() {
    let workdir = tempdir().unwrap();
    loader()
        .current_dir(workdir.path())
        .arg("ingest")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Missing required environment variables"))
        .stderr(predicate::str::contains("ELASTIC_ID"));
}

#[test]
fn check_prints_resolved_targets() {
    let workdir = tempdir().unwrap();
    loader()
        .current_dir(workdir.path())
        .args(["check", "--source", "./catalog", "--index", "stac"])
        .env("ELASTIC_ID", cloud_id())
        .env("ELASTIC_USERNAME", "elastic")
        .env("ELASTIC_PASSWORD", "changeme")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK"))
        .stdout(predicate::str::contains("endpoint=https://abc123.eu-west-1.aws.found.io"))
        .stdout(predicate::str::contains("(filesystem)"))
        .stdout(predicate::str::contains("concurrency=25"));
}

#[test]
fn check_rejects_malformed_cloud_id() {
    let workdir = tempdir().unwrap();
    loader()
        .current_dir(workdir.path())
        .args(["check", "--source", "./catalog", "--index", "stac"])
        .env("ELASTIC_ID", "not-a-cloud-id")
        .env("ELASTIC_USERNAME", "elastic")
        .env("ELASTIC_PASSWORD", "changeme")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cloud id"));
}

#[test]
fn unknown_subcommand_is_a_usage_error() {
    loader().arg("frobnicate").assert().failure().code(2);
}
