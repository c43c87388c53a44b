//! E2E tests for the `cogsim` binary.

mod common;

use common::{cogsim_cmd, write_file, BROKEN_MODEL, STARTER_MODEL};
use predicates::prelude::*;

#[test]
fn help_lists_subcommands() {
    let tmp = tempfile::tempdir().unwrap();
    cogsim_cmd(tmp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn config_prints_effective_toml() {
    let tmp = tempfile::tempdir().unwrap();
    cogsim_cmd(tmp.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("[scheduler]"))
        .stdout(predicate::str::contains("cycle_time = 0.05"));
}

#[test]
fn config_reads_project_file() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join(".cogsim");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "[scheduler]\ncycle_time = 0.2\n").unwrap();

    cogsim_cmd(tmp.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("cycle_time = 0.2"));
}

#[test]
fn env_var_sets_max_cycles() {
    let tmp = tempfile::tempdir().unwrap();
    cogsim_cmd(tmp.path())
        .env("COGSIM_MAX_CYCLES", "7")
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("max_cycles = 7"));
}

#[test]
fn explicit_config_file_applies() {
    let tmp = tempfile::tempdir().unwrap();
    let file = write_file(tmp.path(), "extra.toml", "[scheduler]\nidle_increment = 0.5\n");

    cogsim_cmd(tmp.path())
        .arg("--config")
        .arg(&file)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("idle_increment = 0.5"));
}

#[test]
fn run_completes_starter_model() {
    let tmp = tempfile::tempdir().unwrap();
    let model = write_file(tmp.path(), "starter.json", STARTER_MODEL);

    cogsim_cmd(tmp.path())
        .arg("run")
        .arg(&model)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"completed\""))
        .stdout(predicate::str::contains("starter"));
}

#[test]
fn run_with_local_env_completes() {
    let tmp = tempfile::tempdir().unwrap();
    let model = write_file(tmp.path(), "starter.json", STARTER_MODEL);

    cogsim_cmd(tmp.path())
        .args(["run", "--local-env"])
        .arg(&model)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"completed\""));
}

#[test]
fn run_reports_aborted_model_and_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let good = write_file(tmp.path(), "starter.json", STARTER_MODEL);
    let bad = write_file(tmp.path(), "broken.json", BROKEN_MODEL);

    cogsim_cmd(tmp.path())
        .arg("run")
        .arg(&good)
        .arg(&bad)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"aborted\""))
        .stdout(predicate::str::contains("\"completed\""))
        .stderr(predicate::str::contains("1 model(s) aborted"))
        .stderr(predicate::str::contains("broken"));
}

#[test]
fn run_rejects_invalid_definition() {
    let tmp = tempfile::tempdir().unwrap();
    let model = write_file(tmp.path(), "bad.json", r#"{"name": "x", "buffers": [], "productions": [{"name": "p", "conditions": []}]}"#);

    cogsim_cmd(tmp.path())
        .arg("run")
        .arg(&model)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid model definition"));
}

#[test]
fn run_missing_file_fails() {
    let tmp = tempfile::tempdir().unwrap();
    cogsim_cmd(tmp.path())
        .args(["run", "does-not-exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn run_requires_a_model() {
    let tmp = tempfile::tempdir().unwrap();
    cogsim_cmd(tmp.path()).arg("run").assert().failure();
}

#[test]
fn negative_max_time_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let model = write_file(tmp.path(), "starter.json", STARTER_MODEL);

    cogsim_cmd(tmp.path())
        .args(["run", "--max-time=-1"])
        .arg(&model)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config error"));
}

#[test]
fn serve_rejects_malformed_credentials() {
    let tmp = tempfile::tempdir().unwrap();
    cogsim_cmd(tmp.path())
        .args(["serve", "--addr", "127.0.0.1:0", "--credentials", "no-secret"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected identity:secret"));
}
