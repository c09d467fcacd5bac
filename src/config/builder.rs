use crate::config::defaults::{DEFAULT_MIGRATIONS_DIR, default_schemas};
use crate::config::{merge::Merge, types::*};
use crate::constants::DEFAULT_MIGRATIONS_TABLE;
use crate::runner::PrivilegedMode;
use anyhow::{Result, anyhow};
use std::collections::HashSet;
use std::time::Duration;

pub struct ConfigBuilder {
    config_input: ConfigInput,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config_input: ConfigInput::default(),
        }
    }

    pub fn with_file(mut self, file_input: ConfigInput) -> Self {
        self.config_input = self.config_input.merge(file_input);
        self
    }

    pub fn with_cli_args(mut self, cli_input: ConfigInput) -> Self {
        self.config_input = self.config_input.merge(cli_input);
        self
    }

    pub fn resolve(self) -> Result<Config> {
        let defaults = RunnerConfig::default();

        Ok(Config {
            database_url: self.resolve_database_url(),
            migrations_dir: self
                .config_input
                .migrations_dir
                .clone()
                .unwrap_or_else(|| DEFAULT_MIGRATIONS_DIR.to_string()),
            schemas: self.resolve_schemas()?,
            runner: self.resolve_runner(&defaults)?,
        })
    }

    fn resolve_database_url(&self) -> Option<String> {
        self.config_input
            .database_url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
    }

    fn resolve_schemas(&self) -> Result<Vec<SchemaConfig>> {
        let Some(inputs) = self.config_input.schemas.as_ref() else {
            return Ok(default_schemas());
        };

        let mut seen = HashSet::new();
        inputs
            .iter()
            .map(|input| {
                if input.name.trim().is_empty() {
                    return Err(anyhow!("Schema entries must have a name"));
                }
                if !seen.insert(input.name.as_str()) {
                    return Err(anyhow!("Schema {:?} is configured more than once", input.name));
                }

                Ok(SchemaConfig {
                    name: input.name.clone(),
                    migrations_table: input
                        .migrations_table
                        .clone()
                        .unwrap_or_else(|| DEFAULT_MIGRATIONS_TABLE.to_string()),
                    database_url: input.database_url.clone(),
                })
            })
            .collect()
    }

    fn resolve_runner(&self, defaults: &RunnerConfig) -> Result<RunnerConfig> {
        let runner_input = self.config_input.runner.as_ref();

        let privileged_mode = match runner_input.and_then(|r| r.privileged_mode.as_deref()) {
            Some(mode) => mode.parse::<PrivilegedMode>()?,
            None => defaults.privileged_mode,
        };

        Ok(RunnerConfig {
            parallel: runner_input
                .and_then(|r| r.parallel)
                .unwrap_or(defaults.parallel),
            privileged_mode,
            privileged_hash: runner_input
                .and_then(|r| r.privileged_hash.as_ref())
                .cloned()
                .or_else(|| defaults.privileged_hash.clone()),
            ignore_single_dirty_log: runner_input
                .and_then(|r| r.ignore_single_dirty_log)
                .unwrap_or(defaults.ignore_single_dirty_log),
            ignore_single_pending_log: runner_input
                .and_then(|r| r.ignore_single_pending_log)
                .unwrap_or(defaults.ignore_single_pending_log),
            lock_poll_interval: runner_input
                .and_then(|r| r.lock_poll_interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_poll_interval),
            index_poll_interval: runner_input
                .and_then(|r| r.index_poll_interval_ms)
                .map(Duration::from_millis)
                .unwrap_or(defaults.index_poll_interval),
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
