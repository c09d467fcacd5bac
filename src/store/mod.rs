//! Per-schema persistence consumed by the runner.
//!
//! The [`Store`] trait is the only way the runner touches a database. The
//! PostgreSQL implementation lives in [`postgres`].

pub mod describe;
pub mod error_context;
pub mod postgres;

pub use error_context::{SqlErrorContext, is_duplicate_object};
pub use postgres::{PostgresStore, PostgresStoreFactory};

use crate::definition::Definition;
use crate::schema::SchemaDescription;
use crate::schemas::Schema;
use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Point-in-time migration state reported by a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaVersion {
    pub applied_versions: Vec<i64>,
    pub pending_versions: Vec<i64>,
    pub failed_versions: Vec<i64>,
}

/// Progress of a concurrent index build. `phase` is `None` when no build is
/// running.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStatus {
    pub is_valid: bool,
    pub phase: Option<String>,
    pub lockers_done: Option<i64>,
    pub lockers_total: Option<i64>,
    pub blocks_done: Option<i64>,
    pub blocks_total: Option<i64>,
    pub tuples_done: Option<i64>,
    pub tuples_total: Option<i64>,
}

impl IndexStatus {
    pub fn is_building(&self) -> bool {
        self.phase.is_some()
    }
}

/// A held session advisory lock.
#[async_trait]
pub trait AdvisoryLock: Send + Sync {
    async fn release(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Open a transaction (or a savepoint when already inside one).
    async fn transact(&self) -> Result<Box<dyn Store>>;

    /// Commit when `result` is `Ok`, roll back otherwise. The original error
    /// is returned after a rollback.
    async fn done(self: Box<Self>, result: Result<()>) -> Result<()>;

    async fn versions(&self) -> Result<SchemaVersion>;

    async fn run_ddl_statements(&self, statements: &[String]) -> Result<()>;

    /// Try once to take the schema's advisory lock.
    async fn try_lock(&self) -> Result<Option<Box<dyn AdvisoryLock>>>;

    async fn up(&self, definition: &Definition) -> Result<()>;

    async fn down(&self, definition: &Definition) -> Result<()>;

    /// Record a migration log entry around `body`: started before it runs,
    /// finished with its outcome afterwards.
    async fn with_migration_log<'a>(
        &'a self,
        definition: &'a Definition,
        up: bool,
        body: BoxFuture<'a, Result<()>>,
    ) -> Result<()>;

    /// `None` when the index does not exist.
    async fn index_status(&self, table_name: &str, index_name: &str)
    -> Result<Option<IndexStatus>>;

    /// Live schema descriptions keyed by namespace.
    async fn describe(&self) -> Result<BTreeMap<String, SchemaDescription>>;
}

/// Opens the store backing one schema.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn open(&self, schema: &Schema) -> Result<Arc<dyn Store>>;
}
