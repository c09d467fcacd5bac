use crate::config::types::*;
use crate::constants::{
    DEFAULT_MIGRATIONS_TABLE, DEFAULT_SCHEMA_NAME, INDEX_POLL_INTERVAL, LOCK_POLL_INTERVAL,
};
use crate::runner::PrivilegedMode;

pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

impl SchemaConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            database_url: None,
        }
    }
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self::named(DEFAULT_SCHEMA_NAME)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            privileged_mode: PrivilegedMode::Apply,
            privileged_hash: None,
            ignore_single_dirty_log: false,
            ignore_single_pending_log: false,
            lock_poll_interval: LOCK_POLL_INTERVAL,
            index_poll_interval: INDEX_POLL_INTERVAL,
        }
    }
}

pub fn default_schemas() -> Vec<SchemaConfig> {
    vec![SchemaConfig::default()]
}
