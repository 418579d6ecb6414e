#![allow(clippy::unwrap_used)]
//! Integration tests spawning party processes.

use std::{
    process::{Child, Command, Output, Stdio},
    time::{Duration, Instant},
};

fn party(args: &[&str]) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_polyshare-party"));
    cmd.args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

fn spawn_all(runs: &[Vec<&str>]) -> Vec<Output> {
    let children: Vec<Child> = runs
        .iter()
        .map(|args| party(args).arg("--timeout-secs=30").spawn().unwrap())
        .collect();
    children
        .into_iter()
        .map(|c| c.wait_with_output().unwrap())
        .collect()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[test]
fn too_large_threshold_fails_before_connecting() {
    let start = Instant::now();
    let output = party(&["1", "3", "Shamir", "2", "--insecure-shared-seed"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).is_empty());
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[test]
fn unknown_protocol_prints_usage() {
    let output = party(&["0", "2", "Rep3"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"));
    assert!(stderr.contains("MalShamir"));
}

#[test]
fn missing_arguments_are_a_usage_error() {
    let output = party(&["0"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn preprocessing_source_is_required() {
    let output = party(&["0", "2", "--port-base=47370"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--insecure-shared-seed"));
}

#[test]
fn spdz2k_parties_compute_modulo_2_64() {
    let outputs = spawn_all(&[
        vec!["2", "2", "SPDZ2k", "--port-base=47360", "--trusted-dealer=2"],
        vec![
            "0",
            "2",
            "SPDZ2k",
            "--port-base=47360",
            "--trusted-dealer=2",
            "--inputs=18446744073709551615,5",
        ],
        vec!["1", "2", "SPDZ2k", "--port-base=47360", "--trusted-dealer=2", "--inputs=2,7"],
    ]);
    for output in &outputs[1..] {
        assert_eq!(output.status.code(), Some(0));
        // 2 * (2^64 - 1) + 35 = 33 mod 2^64
        assert_eq!(stdout(output), "result: 33");
    }
}

#[test]
fn two_parties_compute_dot_product() {
    let outputs = spawn_all(&[
        vec!["0", "2", "--port-base=47310", "--insecure-shared-seed", "--inputs=1,2,3"],
        vec!["1", "2", "--port-base=47310", "--insecure-shared-seed", "--inputs=4,5,6"],
    ]);
    for output in outputs {
        assert_eq!(output.status.code(), Some(0));
        assert_eq!(stdout(&output), "result: 32");
    }
}

#[test]
fn three_shamir_parties_with_default_inputs() {
    let outputs = spawn_all(&[
        vec!["0", "3", "Shamir", "1", "--port-base=47320", "--insecure-shared-seed"],
        vec!["1", "3", "Shamir", "1", "--port-base=47320", "--insecure-shared-seed"],
        vec!["2", "3", "Shamir", "1", "--port-base=47320", "--insecure-shared-seed"],
    ]);
    for output in outputs {
        assert_eq!(output.status.code(), Some(0));
        assert_eq!(stdout(&output), "result: 332833500");
    }
}

#[test]
fn trusted_dealer_serves_both_parties() {
    let outputs = spawn_all(&[
        vec!["2", "2", "CowGear", "--port-base=47330", "--trusted-dealer=2"],
        vec!["0", "2", "CowGear", "--port-base=47330", "--trusted-dealer=2", "--inputs=1,2,3"],
        vec!["1", "2", "CowGear", "--port-base=47330", "--trusted-dealer=2", "--inputs=4,5,6"],
    ]);
    assert_eq!(outputs[0].status.code(), Some(0));
    assert!(stdout(&outputs[0]).is_empty());
    for output in &outputs[1..] {
        assert_eq!(output.status.code(), Some(0));
        assert_eq!(stdout(output), "result: 32");
    }
}

#[test]
fn exhausted_dealer_is_reported() {
    let outputs = spawn_all(&[
        vec!["2", "2", "Semi", "--port-base=47340", "--trusted-dealer=2", "--triple-budget=2"],
        vec!["0", "2", "Semi", "--port-base=47340", "--trusted-dealer=2", "--inputs=1,2,3"],
        vec!["1", "2", "Semi", "--port-base=47340", "--trusted-dealer=2", "--inputs=4,5,6"],
    ]);
    for output in &outputs[1..] {
        assert_eq!(output.status.code(), Some(4));
        assert!(stdout(output).is_empty());
    }
}

#[test]
fn unreachable_peer_is_a_network_failure() {
    let output = party(&["0", "2", "--port-base=47350", "--insecure-shared-seed"])
        .arg("--timeout-secs=1")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}
