use super::build_runner;
use crate::config::Config;
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Print (or save) the live description of the database behind a schema.
pub async fn cmd_describe(
    config: &Config,
    root_dir: &Path,
    schema: &str,
    out: Option<&Path>,
) -> Result<()> {
    let runner = build_runner(config, root_dir)?;
    let descriptions = runner.describe(schema).await?;
    let json = serde_json::to_string_pretty(&descriptions)?;

    match out {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(schema, path = %path.display(), "Wrote schema description");
            println!("📄 Wrote description of {} to {}", schema, path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
