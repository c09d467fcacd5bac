use crate::runner::PrivilegedMode;
use clap::Args;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw configuration input - all fields Optional for merging
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigInput {
    pub database_url: Option<String>,
    pub migrations_dir: Option<String>,
    pub schemas: Option<Vec<SchemaInput>>,
    pub runner: Option<RunnerInput>,
}

/// Resolved configuration with all defaults applied
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Database shared by every schema without its own URL
    pub database_url: Option<String>,
    pub migrations_dir: String,
    pub schemas: Vec<SchemaConfig>,
    pub runner: RunnerConfig,
}

// Schema registry
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemaInput {
    pub name: String,
    pub migrations_table: Option<String>,
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaConfig {
    pub name: String,
    pub migrations_table: String,
    pub database_url: Option<String>,
}

impl SchemaConfig {
    /// The schema's own database URL, falling back to the shared one.
    pub fn database_url<'a>(&'a self, config: &'a Config) -> Option<&'a str> {
        self.database_url
            .as_deref()
            .or(config.database_url.as_deref())
    }
}

// Runner behavior
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunnerInput {
    pub parallel: Option<bool>,
    pub privileged_mode: Option<String>,
    pub privileged_hash: Option<String>,
    pub ignore_single_dirty_log: Option<bool>,
    pub ignore_single_pending_log: Option<bool>,
    pub lock_poll_interval_ms: Option<u64>,
    pub index_poll_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub parallel: bool,
    pub privileged_mode: PrivilegedMode,
    pub privileged_hash: Option<String>,
    pub ignore_single_dirty_log: bool,
    pub ignore_single_pending_log: bool,
    pub lock_poll_interval: Duration,
    pub index_poll_interval: Duration,
}

// CLI arguments
#[derive(Debug, Clone, Default, Args)]
pub struct DatabaseArgs {
    #[arg(long, help = "Database URL shared by every schema (defaults to $DATABASE_URL)")]
    pub database_url: Option<String>,

    #[arg(long, help = "Directory holding one migrations directory per schema")]
    pub migrations_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunnerArgs {
    #[arg(long, help = "Migrate schemas concurrently")]
    pub parallel: bool,

    #[arg(long, help = "How to handle privileged migrations: apply, refuse, or noop")]
    pub privileged_mode: Option<String>,

    #[arg(long, help = "Acknowledgement hash for skipping privileged migrations")]
    pub privileged_hash: Option<String>,

    #[arg(long, help = "Retry a single failed migration that is next to apply")]
    pub ignore_single_dirty_log: bool,

    #[arg(long, help = "Resume a single unfinished migration")]
    pub ignore_single_pending_log: bool,
}

// Conversion functions from CLI args to config input
impl From<DatabaseArgs> for ConfigInput {
    fn from(args: DatabaseArgs) -> Self {
        Self {
            database_url: args.database_url,
            migrations_dir: args.migrations_dir,
            schemas: None, // Schema list comes from file only
            runner: None,
        }
    }
}

impl From<RunnerArgs> for RunnerInput {
    fn from(args: RunnerArgs) -> Self {
        Self {
            parallel: args.parallel.then_some(true),
            privileged_mode: args.privileged_mode,
            privileged_hash: args.privileged_hash,
            ignore_single_dirty_log: args.ignore_single_dirty_log.then_some(true),
            ignore_single_pending_log: args.ignore_single_pending_log.then_some(true),
            lock_poll_interval_ms: None,
            index_poll_interval_ms: None,
        }
    }
}
