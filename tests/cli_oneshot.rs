// Exercises the `sentrywatch` binary end-to-end in `--oneShot` mode against
// a minimal config, without any real consumers or network dependencies.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("sentrywatch.yml");
    fs::write(&path, contents).expect("failed to write config");
    path
}

#[test]
fn one_shot_run_exits_clean_with_a_single_command_checker() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let config_path = write_config(
        &temp_dir,
        r#"
periodicity: 1
plugins:
  - type: Command
    config: {}
    checks:
      - name: always-ok
        command: "true"
"#,
    );

    Command::cargo_bin("sentrywatch")
        .expect("failed to find sentrywatch binary")
        .arg("--cfg")
        .arg(&config_path)
        .arg("--oneShot")
        .assert()
        .success();
}

#[test]
fn unknown_checker_kind_is_skipped_without_failing_startup() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let config_path = write_config(
        &temp_dir,
        r#"
periodicity: 1
plugins:
  - type: DoesNotExist
    config: {}
    checks:
      - name: irrelevant
  - type: Command
    config: {}
    checks:
      - name: always-ok
        command: "true"
"#,
    );

    Command::cargo_bin("sentrywatch")
        .expect("failed to find sentrywatch binary")
        .arg("--cfg")
        .arg(&config_path)
        .arg("--oneShot")
        .assert()
        .success();
}

#[test]
fn malformed_config_exits_nonzero() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let config_path = write_config(&temp_dir, "periodicity: 1\nbogus_top_level_field: true\n");

    Command::cargo_bin("sentrywatch")
        .expect("failed to find sentrywatch binary")
        .arg("--cfg")
        .arg(&config_path)
        .arg("--oneShot")
        .assert()
        .failure();
}

#[test]
fn missing_config_file_exits_nonzero_with_message() {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let missing_path = temp_dir.path().join("does-not-exist.yml");

    Command::cargo_bin("sentrywatch")
        .expect("failed to find sentrywatch binary")
        .arg("--cfg")
        .arg(&missing_path)
        .arg("--oneShot")
        .assert()
        .failure()
        .stderr(predicate::str::contains("fatal error").or(predicate::str::contains("unable to read")));
}
