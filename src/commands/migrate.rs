use super::{build_runner, runner_options, selected_schemas};
use crate::config::Config;
use crate::runner::MigrationOperation;
use anyhow::Result;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Apply every outstanding migration of the selected schemas.
pub async fn cmd_up(
    config: &Config,
    root_dir: &Path,
    cancel: &CancellationToken,
    schemas: &[String],
) -> Result<()> {
    let operations = selected_schemas(config, schemas)
        .into_iter()
        .map(MigrationOperation::upgrade)
        .collect();
    run(config, root_dir, cancel, operations).await?;
    println!("✅ Schemas are up to date");
    Ok(())
}

/// Apply migrations of one schema up to and including `targets`.
pub async fn cmd_upto(
    config: &Config,
    root_dir: &Path,
    cancel: &CancellationToken,
    schema: &str,
    targets: &[i64],
) -> Result<()> {
    let operation = MigrationOperation::targeted_up(schema, targets.to_vec());
    run(config, root_dir, cancel, vec![operation]).await?;
    println!("✅ Schema {} migrated up to {:?}", schema, targets);
    Ok(())
}

/// Unapply every migration of one schema that descends from `targets`.
pub async fn cmd_down(
    config: &Config,
    root_dir: &Path,
    cancel: &CancellationToken,
    schema: &str,
    targets: &[i64],
) -> Result<()> {
    let operation = MigrationOperation::targeted_down(schema, targets.to_vec());
    run(config, root_dir, cancel, vec![operation]).await?;
    println!("✅ Schema {} migrated down to {:?}", schema, targets);
    Ok(())
}

/// Undo the most recent migration of one schema.
pub async fn cmd_undo(
    config: &Config,
    root_dir: &Path,
    cancel: &CancellationToken,
    schema: &str,
) -> Result<()> {
    run(
        config,
        root_dir,
        cancel,
        vec![MigrationOperation::revert(schema)],
    )
    .await?;
    println!("✅ Reverted the last migration of schema {}", schema);
    Ok(())
}

async fn run(
    config: &Config,
    root_dir: &Path,
    cancel: &CancellationToken,
    operations: Vec<MigrationOperation>,
) -> Result<()> {
    let runner = build_runner(config, root_dir)?;
    let options = crate::runner::Options {
        operations,
        ..runner_options(config)
    };

    info!(
        schemas = options.operations.len(),
        privileged_mode = %options.privileged_mode,
        "Running migrations"
    );
    runner.run(cancel, options).await
}
