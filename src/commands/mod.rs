pub mod describe;
pub mod drift;
pub mod migrate;
pub mod validate;

// Re-export all command functions
pub use describe::cmd_describe;
pub use drift::{DriftArgs, cmd_drift};
pub use migrate::{cmd_down, cmd_undo, cmd_up, cmd_upto};
pub use validate::cmd_validate;

use crate::config::Config;
use crate::runner::{Options, Runner, privileged_hash_matcher};
use crate::schemas::{Schema, SchemaRegistry};
use crate::store::{PostgresStoreFactory, StoreFactory};
use anyhow::{Result, anyhow};
use console::style;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Load every configured schema and wire it to its database.
pub fn build_runner(config: &Config, root_dir: &Path) -> Result<Runner> {
    let migrations_dir = root_dir.join(&config.migrations_dir);

    let mut schemas = Vec::with_capacity(config.schemas.len());
    let mut factories: HashMap<String, Arc<dyn StoreFactory>> = HashMap::new();
    for schema_config in &config.schemas {
        let database_url = schema_config.database_url(config).ok_or_else(|| {
            anyhow!(
                "No database URL for schema {:?}. Set database_url in the config file, pass --database-url, or export DATABASE_URL",
                schema_config.name
            )
        })?;

        let schema = Schema::load(
            &schema_config.name,
            &schema_config.migrations_table,
            &migrations_dir,
        )?;
        debug!(
            schema = %schema.name,
            definitions = schema.definitions.all().len(),
            "Loaded migration definitions"
        );

        factories.insert(
            schema_config.name.clone(),
            Arc::new(PostgresStoreFactory::new(database_url)),
        );
        schemas.push(schema);
    }

    Ok(Runner::new(SchemaRegistry::new(schemas)?, factories)
        .with_poll_intervals(config.runner.lock_poll_interval, config.runner.index_poll_interval))
}

/// Runner options from the resolved configuration.
pub fn runner_options(config: &Config) -> Options {
    Options {
        operations: Vec::new(),
        parallel: config.runner.parallel,
        privileged_mode: config.runner.privileged_mode,
        matches_privileged_hash: config
            .runner
            .privileged_hash
            .clone()
            .map(privileged_hash_matcher),
        ignore_single_dirty_log: config.runner.ignore_single_dirty_log,
        ignore_single_pending_log: config.runner.ignore_single_pending_log,
    }
}

/// The schemas named on the command line, or every configured schema.
pub fn selected_schemas(config: &Config, requested: &[String]) -> Vec<String> {
    if requested.is_empty() {
        config.schemas.iter().map(|s| s.name.clone()).collect()
    } else {
        requested.to_vec()
    }
}

/// Print remediation steps for classified runner failures.
pub fn print_error_instructions(error: &anyhow::Error) {
    let Some(runner_error) = crate::runner::find_runner_error(error) else {
        return;
    };

    eprintln!();
    eprintln!("{}", style("What to do next:").yellow().bold());
    eprintln!("  {}", runner_error.instructions());
}
