//! CLI integration tests

use std::process::Command;

fn bridgectl() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_bridgectl"));
    command.env_remove("BRIDGECTL_API_URL");
    command
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = bridgectl()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("workspace bridge"), "Should show app description");
    assert!(stdout.contains("create"), "Should show create command");
    assert!(stdout.contains("inspect"), "Should show inspect command");
    assert!(stdout.contains("servers"), "Should show servers command");
    assert!(stdout.contains("rm"), "Should show rm command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = bridgectl()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("bridgectl"), "Should show binary name");
}

/// Test create subcommand help
#[test]
fn test_create_help() {
    let output = bridgectl()
        .args(["create", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Create help should succeed");
    assert!(stdout.contains("--name"), "Should show name option");
    assert!(stdout.contains("--port"), "Should show port option");
    assert!(stdout.contains("--volume"), "Should show volume option");
    assert!(stdout.contains("--label"), "Should show label option");
}

/// Test servers subcommand help
#[test]
fn test_servers_help() {
    let output = bridgectl()
        .args(["servers", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Servers help should succeed");
    assert!(stdout.contains("--server"), "Should show server option");
}

/// Test rm subcommand help
#[test]
fn test_rm_help() {
    let output = bridgectl()
        .args(["rm", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Rm help should succeed");
    assert!(stdout.contains("--force"), "Should show force option");
    assert!(stdout.contains("--volumes"), "Should show volumes option");
}

/// Test files subcommand help
#[test]
fn test_files_help() {
    let output = bridgectl()
        .args(["files", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Files help should succeed");
    assert!(stdout.contains("--clear"), "Should show clear option");
}

/// Test format and api-url options
#[test]
fn test_global_options() {
    let output = bridgectl()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("table"), "Should show table format");
    assert!(stdout.contains("json"), "Should show json format");
    assert!(stdout.contains("--api-url"), "Should show api-url option");
    assert!(stdout.contains("BRIDGECTL_API_URL"), "Should show env var");
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = bridgectl()
        .arg("invalid-command")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}

/// Test missing required argument error handling
#[test]
fn test_missing_argument() {
    let output = bridgectl()
        .arg("inspect")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Missing argument should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("required") || stderr.contains("error"),
        "Should show error about missing argument"
    );
}

/// Unreachable agent is reported as an error, not a panic
#[test]
fn test_unreachable_agent() {
    let output = bridgectl()
        .args(["--api-url", "http://127.0.0.1:9", "inspect", "abc"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Unreachable agent should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to send request"));
}
