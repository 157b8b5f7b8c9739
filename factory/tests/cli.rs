//! CLI tests for the `factory` binary.
//!
//! Spawns the binary and verifies exit codes for commands that never reach
//! the model endpoint.

use std::fs;
use std::process::Command;

use factory::exit_codes;
use factory::io::config::{FactoryConfig, load_config};

#[test]
fn init_writes_default_config() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = Command::new(env!("CARGO_BIN_EXE_factory"))
        .current_dir(temp.path())
        .arg("init")
        .status()
        .expect("factory init");

    assert_eq!(status.code(), Some(exit_codes::OK));
    let cfg = load_config(&temp.path().join("factory.toml")).expect("load");
    assert_eq!(cfg, FactoryConfig::default());
}

#[test]
fn init_keeps_existing_config_without_force() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("custom.toml");
    fs::write(&path, "model = \"gemini-2.5-pro\"\n").expect("write");

    let status = Command::new(env!("CARGO_BIN_EXE_factory"))
        .current_dir(temp.path())
        .args(["init", "--config", "custom.toml"])
        .status()
        .expect("factory init");

    assert_eq!(status.code(), Some(exit_codes::OK));
    let cfg = load_config(&path).expect("load");
    assert_eq!(cfg.model, "gemini-2.5-pro");
}

#[test]
fn run_with_zero_iterations_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = Command::new(env!("CARGO_BIN_EXE_factory"))
        .current_dir(temp.path())
        .env("GOOGLE_API_KEY", "")
        .args(["run", "--request", "Crie uma calculadora", "--max-iterations", "0"])
        .output()
        .expect("factory run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_iterations must be > 0"));
}

#[test]
fn run_without_request_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");

    let status = Command::new(env!("CARGO_BIN_EXE_factory"))
        .current_dir(temp.path())
        .arg("run")
        .status()
        .expect("factory run");

    assert_eq!(status.code(), Some(exit_codes::INVALID));
}
