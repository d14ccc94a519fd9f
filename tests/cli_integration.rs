//! End-to-end runs of the `pipeline-cosim` binary.

mod common;

use std::fs;
use std::process::Command;

fn binary() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pipeline-cosim"))
}

#[test]
fn network_prints_description_to_stdout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let network = common::write_file(dir.path(), "chain.json", common::CHAIN_NETWORK);

    let output = binary()
        .arg("--network")
        .arg(&network)
        .output()
        .expect("run binary");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, common::chain_description().to_xml().expect("xml"));
}

#[test]
fn out_flag_writes_description_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let network = common::write_file(dir.path(), "chain.json", common::CHAIN_NETWORK);
    let out = dir.path().join("modelDescription.xml");

    let status = binary()
        .arg("--network")
        .arg(&network)
        .arg("--out")
        .arg(&out)
        .status()
        .expect("run binary");
    assert!(status.success());
    let written = fs::read_to_string(&out).expect("description written");
    assert!(written.contains(r#"name="__DUMMY""#));
}

/// Pipe delays of the chain (0.5 s + 0.25 s) take precedence over the
/// configured uniform delay.
#[test]
fn session_run_exports_telemetry() {
    let dir = tempfile::tempdir().expect("tempdir");
    let network = common::write_file(dir.path(), "chain.json", common::CHAIN_NETWORK);
    let config = common::write_file(dir.path(), "run.toml", common::CHAIN_RUN_CONFIG);
    let csv = dir.path().join("samples.csv");

    let output = binary()
        .arg("--network")
        .arg(&network)
        .arg("--config")
        .arg(&config)
        .arg("--telemetry-out")
        .arg(&csv)
        .output()
        .expect("run binary");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Session Report"));

    let rows = fs::read_to_string(&csv).expect("telemetry written");
    let lines: Vec<&str> = rows.lines().collect();
    assert_eq!(
        lines,
        vec![
            "time,variable,value_reference,value,kind",
            "1.000000,A,1001,17,injected",
            "1.750000,C,2001,17,received",
        ]
    );
}

#[test]
fn run_from_existing_description() {
    let dir = tempfile::tempdir().expect("tempdir");
    let description = dir.path().join("modelDescription.xml");
    common::chain_description()
        .write_to_file(&description)
        .expect("write description");
    let config = common::write_file(dir.path(), "run.toml", common::CHAIN_RUN_CONFIG);
    let csv = dir.path().join("samples.csv");

    let status = binary()
        .arg("--description")
        .arg(&description)
        .arg("--config")
        .arg(&config)
        .arg("--telemetry-out")
        .arg(&csv)
        .status()
        .expect("run binary");
    assert!(status.success());

    // No pipes to read delays from: the configured delay applies.
    let rows = fs::read_to_string(&csv).expect("telemetry written");
    assert!(rows.contains("2.500000,C,2001,17,received"));
}

#[test]
fn injection_into_output_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let network = common::write_file(dir.path(), "chain.json", common::CHAIN_NETWORK);
    let config = common::write_file(
        dir.path(),
        "run.toml",
        &common::CHAIN_RUN_CONFIG.replace("variable = \"A\"", "variable = \"C\""),
    );

    let output = binary()
        .arg("--network")
        .arg(&network)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("run binary");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("session.injections[0].variable"));
}

#[test]
fn unsupported_network_format_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let network = common::write_file(
        dir.path(),
        "chain.json",
        &common::CHAIN_NETWORK.replace("\"1.0\"", "\"2.0\""),
    );
    let status = binary()
        .arg("--network")
        .arg(&network)
        .status()
        .expect("run binary");
    assert_eq!(status.code(), Some(1));
}

#[test]
fn unknown_flag_is_usage_error() {
    let status = binary().arg("--bogus").status().expect("run binary");
    assert_eq!(status.code(), Some(2));
}
