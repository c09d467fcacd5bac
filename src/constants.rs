use std::time::Duration;

// Advisory lock polling
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const LOCK_POLL_LOG_RATIO: usize = 5;

// Concurrent index build polling
pub const INDEX_POLL_INTERVAL: Duration = Duration::from_secs(5);

// Configuration file name
pub const CONFIG_FILENAME: &str = "schemaflow.yaml";

// Migration definition layout
pub const UP_FILENAME: &str = "up.sql";
pub const DOWN_FILENAME: &str = "down.sql";
pub const METADATA_FILENAME: &str = "metadata.yaml";

// Default schema registry
pub const DEFAULT_SCHEMA_NAME: &str = "frontend";
pub const DEFAULT_MIGRATIONS_TABLE: &str = "migration_logs";

// Version of the migration log table layout written by the PostgreSQL store
pub const MIGRATION_LOGS_SCHEMA_VERSION: i32 = 2;

// SQLSTATE codes raised when an object being created already exists
pub const SQLSTATE_DUPLICATE_TABLE: &str = "42P07";
pub const SQLSTATE_DUPLICATE_OBJECT: &str = "42710";

// Reference documentation linked from drift summaries
pub const POSTGRES_DOCS_URL: &str = "https://www.postgresql.org/docs/current";
