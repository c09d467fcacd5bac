use crate::helpers::cli::{CliTestHelper, with_cli_helper};
use anyhow::Result;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    let helper = CliTestHelper::new();
    let assert = helper.command().arg("--help").assert().success();
    let output = String::from_utf8_lossy(&assert.get_output().stdout).to_string();

    for command in ["up", "upto", "down", "undo", "validate", "describe", "drift"] {
        assert!(output.contains(command), "missing {} in:\n{}", command, output);
    }
}

#[tokio::test]
async fn test_invalid_config_file() -> Result<()> {
    with_cli_helper(async |helper| {
        helper.write_file("schemaflow.yaml", "schemas: [unterminated")?;

        helper
            .command()
            .args(["validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse config file"));

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_invalid_privileged_mode_in_config() -> Result<()> {
    with_cli_helper(async |helper| {
        helper.write_file("schemaflow.yaml", "runner:\n  privileged_mode: sometimes\n")?;

        helper
            .command()
            .args(["validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("sometimes"));

        Ok(())
    })
    .await
}

#[tokio::test]
async fn test_missing_database_url() -> Result<()> {
    with_cli_helper(async |helper| {
        helper
            .command()
            .args(["validate"])
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("No database URL for schema"));

        Ok(())
    })
    .await
}

#[test]
fn test_upto_requires_targets() {
    let helper = CliTestHelper::new();
    helper
        .command()
        .args(["upto", "--schema", "frontend"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--target"));
}

#[test]
fn test_invalid_privileged_mode_flag() {
    let helper = CliTestHelper::new();
    helper
        .command()
        .args(["up", "--privileged-mode", "sometimes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sometimes"));
}
