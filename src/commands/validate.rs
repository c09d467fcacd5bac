use super::{build_runner, selected_schemas};
use crate::config::Config;
use anyhow::Result;
use std::path::Path;
use tokio_util::sync::CancellationToken;

pub async fn cmd_validate(
    config: &Config,
    root_dir: &Path,
    cancel: &CancellationToken,
    schemas: &[String],
) -> Result<()> {
    println!("🔍 Validating migration state...");

    let runner = build_runner(config, root_dir)?;
    let schemas = selected_schemas(config, schemas);
    runner.validate(cancel, &schemas).await?;

    println!("✅ All migrations are applied to {}", schemas.join(", "));
    Ok(())
}
