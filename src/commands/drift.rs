use super::build_runner;
use crate::config::Config;
use crate::drift::{Summary, compare_schema_descriptions};
use crate::schema::SchemaDescription;
use anyhow::{Context, Result, anyhow};
use clap::Args;
use console::style;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Args)]
pub struct DriftArgs {
    /// Schema whose database is checked
    #[arg(long)]
    pub schema: String,

    /// JSON snapshot of the expected schema description
    #[arg(long)]
    pub expected: PathBuf,

    /// JSON snapshot to compare instead of the live database
    #[arg(long, conflicts_with = "autofix")]
    pub actual: Option<PathBuf>,

    /// Database namespace to compare when describing the live database
    #[arg(long, default_value = "public")]
    pub namespace: String,

    /// Version label of the expected snapshot, for reporting
    #[arg(long, default_value = "current")]
    pub version: String,

    /// Run the suggested SQL against the live database
    #[arg(long)]
    pub autofix: bool,
}

pub async fn cmd_drift(config: &Config, root_dir: &Path, args: &DriftArgs) -> Result<()> {
    let expected = read_description(&args.expected)?;

    let actual = match &args.actual {
        Some(path) => read_description(path)?,
        None => {
            let runner = build_runner(config, root_dir)?;
            let mut descriptions = runner.describe(&args.schema).await?;
            descriptions.remove(&args.namespace).unwrap_or_default()
        }
    };

    let summaries = compare_schema_descriptions(&args.schema, &args.version, &actual, &expected);
    if summaries.is_empty() {
        println!(
            "✅ No drift detected in schema {} (version {})",
            args.schema, args.version
        );
        return Ok(());
    }

    for summary in &summaries {
        print_summary(summary);
    }

    if args.autofix {
        let manual = autofix(config, root_dir, &args.schema, &summaries).await?;
        if manual == 0 {
            println!("✅ Applied fixes for {} drift findings", summaries.len());
            return Ok(());
        }
        return Err(anyhow!(
            "{} drift findings in schema {} need manual repair",
            manual,
            args.schema
        ));
    }

    Err(anyhow!(
        "Schema drift detected: {} differences in schema {}",
        summaries.len(),
        args.schema
    ))
}

fn read_description(path: &Path) -> Result<SchemaDescription> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema description {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse schema description {}", path.display()))
}

fn print_summary(summary: &Summary) {
    println!(
        "{} {}: {}",
        style("⚠").yellow(),
        style(summary.name()).bold(),
        summary.problem()
    );
    println!("  Suggested action: {}", summary.solution());

    if let Some(diff) = summary.render_diff() {
        for line in diff.lines() {
            println!("    {}", style(line).dim());
        }
    }
    if let Some(statements) = summary.statements() {
        for statement in statements {
            println!("    {}", style(statement).cyan());
        }
    }
    if let Some(url) = summary.url_hint() {
        println!("  See {}", url);
    }
    println!();
}

/// Run every suggested statement and return how many findings had none.
async fn autofix(
    config: &Config,
    root_dir: &Path,
    schema: &str,
    summaries: &[Summary],
) -> Result<usize> {
    let statements: Vec<String> = summaries
        .iter()
        .filter_map(|s| s.statements())
        .flatten()
        .cloned()
        .collect();
    let manual = summaries.iter().filter(|s| s.statements().is_none()).count();

    if !statements.is_empty() {
        let runner = build_runner(config, root_dir)?;
        let store = runner.store(schema).await?;
        info!(schema, statements = statements.len(), "Applying drift fixes");
        store
            .run_ddl_statements(&statements)
            .await
            .context("Failed to apply drift fixes")?;
    }

    Ok(manual)
}
