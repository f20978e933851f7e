//! CLI smoke tests against the compiled `clustermesh` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

#[test]
fn validate_config_accepts_well_formed_file() {
    let mut file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
    writeln!(
        file,
        "server:\n  admin_port: 9081\nnodes:\n  - jvm_route: A\n    connection_uri: http://a:1\n    balancer_name: bal\n"
    )
    .unwrap();

    Command::cargo_bin("clustermesh")
        .unwrap()
        .args(["--config", file.path().to_str().unwrap(), "validate-config"])
        .assert()
        .success();
}

#[test]
fn validate_config_rejects_duplicate_jvm_route() {
    let mut file = tempfile::NamedTempFile::with_suffix(".yaml").unwrap();
    writeln!(
        file,
        "nodes:\n  - jvm_route: A\n    connection_uri: http://a:1\n    balancer_name: bal\n  - jvm_route: A\n    connection_uri: http://a:2\n    balancer_name: bal\n"
    )
    .unwrap();

    Command::cargo_bin("clustermesh")
        .unwrap()
        .args(["--config", file.path().to_str().unwrap(), "validate-config"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("duplicate jvm_route"));
}

#[test]
fn dump_topology_reports_connection_failure_cleanly() {
    Command::cargo_bin("clustermesh")
        .unwrap()
        .args(["dump-topology", "--admin-url", "http://127.0.0.1:1"])
        .assert()
        .failure();
}
