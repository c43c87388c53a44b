//! Shared E2E test helpers for `cogsim` binary tests.

use assert_cmd::cargo::cargo_bin_cmd;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout for CLI tests.
pub const TIMEOUT_BASIC: Duration = Duration::from_secs(10);

/// Environment variables read by the config loader.
const CONFIG_VARS: &[&str] = &["COGSIM_DEBUG", "COGSIM_CYCLE_TIME", "COGSIM_MAX_CYCLES", "COGSIM_MAX_TIME"];

/// Empty goal; `begin` places a `start` chunk and the model completes.
pub const STARTER_MODEL: &str = r#"{
  "name": "starter",
  "chunk_types": [{ "name": "start", "slots": [] }],
  "buffers": [{ "name": "goal" }],
  "productions": [
    {
      "name": "begin",
      "conditions": [{ "kind": "empty", "buffer": "goal" }],
      "actions": [{ "action": "set", "buffer": "goal", "template": { "chunk_type": "start" } }]
    }
  ]
}"#;

/// Modifies an empty goal on its first cycle, which aborts the model.
pub const BROKEN_MODEL: &str = r#"{
  "name": "broken",
  "chunk_types": [{ "name": "task", "slots": ["state"] }],
  "buffers": [{ "name": "goal" }],
  "productions": [
    {
      "name": "bad",
      "conditions": [{ "kind": "empty", "buffer": "goal" }],
      "actions": [{ "action": "modify", "buffer": "goal", "slots": {} }]
    }
  ]
}"#;

/// Build a Command for the `cogsim` binary, isolated from the user's
/// global config and `COGSIM_*` environment, rooted at `project`.
pub fn cogsim_cmd(project: &Path) -> assert_cmd::Command {
    let mut cmd: assert_cmd::Command = cargo_bin_cmd!("cogsim");
    cmd.timeout(TIMEOUT_BASIC);
    for var in CONFIG_VARS {
        cmd.env_remove(var);
    }
    cmd.arg("--no-global-config").arg("-C").arg(project);
    cmd
}

/// Writes `contents` to `name` inside `dir`.
pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write fixture");
    path
}
