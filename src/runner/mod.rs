//! Applies migration operations to registered schemas.
//!
//! Each requested schema is migrated by its own task. Within a schema every
//! state check and every migration happens under the schema's advisory lock,
//! so several processes may run the same operation at once.

mod apply;
mod desugar;
pub mod errors;
mod index;
mod lock;
pub mod privileged;
mod state;
mod validate;

pub use errors::{MultiError, RunnerError, find_runner_error};
pub use privileged::{PrivilegedHashMatcher, privileged_hash, privileged_hash_matcher};
pub use state::{DefinitionsByState, group_by_state};

use crate::constants::{INDEX_POLL_INTERVAL, LOCK_POLL_INTERVAL};
use crate::schema::SchemaDescription;
use crate::schemas::{Schema, SchemaRegistry};
use crate::store::{SchemaVersion, Store, StoreFactory};
use anyhow::{Context, Result};
use apply::{ApplyCycle, is_up_to_date, log_by_state};
use desugar::desugar_operation;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOperationType {
    TargetedUp,
    TargetedDown,
    Upgrade,
    Revert,
}

/// What to do with one schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOperation {
    pub schema_name: String,
    pub kind: MigrationOperationType,
    pub target_versions: Vec<i64>,
}

impl MigrationOperation {
    pub fn upgrade(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            kind: MigrationOperationType::Upgrade,
            target_versions: Vec::new(),
        }
    }

    pub fn revert(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            kind: MigrationOperationType::Revert,
            target_versions: Vec::new(),
        }
    }

    pub fn targeted_up(schema_name: impl Into<String>, target_versions: Vec<i64>) -> Self {
        Self {
            schema_name: schema_name.into(),
            kind: MigrationOperationType::TargetedUp,
            target_versions,
        }
    }

    pub fn targeted_down(schema_name: impl Into<String>, target_versions: Vec<i64>) -> Self {
        Self {
            schema_name: schema_name.into(),
            kind: MigrationOperationType::TargetedDown,
            target_versions,
        }
    }
}

/// How privileged migrations are handled when migrating up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrivilegedMode {
    /// Run them like any other migration.
    #[default]
    Apply,
    /// Fail before applying anything.
    Refuse,
    /// Record them as applied without running their SQL.
    Noop,
}

impl FromStr for PrivilegedMode {
    type Err = RunnerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "apply" => Ok(PrivilegedMode::Apply),
            "refuse" => Ok(PrivilegedMode::Refuse),
            "noop" => Ok(PrivilegedMode::Noop),
            _ => Err(RunnerError::InvalidPrivilegedMode(s.to_string())),
        }
    }
}

impl fmt::Display for PrivilegedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PrivilegedMode::Apply => "apply",
            PrivilegedMode::Refuse => "refuse",
            PrivilegedMode::Noop => "noop",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Default)]
pub struct Options {
    pub operations: Vec<MigrationOperation>,
    /// Migrate schemas concurrently instead of one at a time.
    pub parallel: bool,
    pub privileged_mode: PrivilegedMode,
    /// Required in noop mode.
    pub matches_privileged_hash: Option<PrivilegedHashMatcher>,
    pub ignore_single_dirty_log: bool,
    pub ignore_single_pending_log: bool,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("operations", &self.operations)
            .field("parallel", &self.parallel)
            .field("privileged_mode", &self.privileged_mode)
            .field(
                "matches_privileged_hash",
                &self.matches_privileged_hash.is_some(),
            )
            .field("ignore_single_dirty_log", &self.ignore_single_dirty_log)
            .field("ignore_single_pending_log", &self.ignore_single_pending_log)
            .finish()
    }
}

impl Options {
    /// Checks that need no database access.
    fn validate(&self) -> Result<(), RunnerError> {
        if self.privileged_mode == PrivilegedMode::Noop && self.matches_privileged_hash.is_none() {
            return Err(RunnerError::MissingPrivilegedHashMatcher);
        }

        let mut seen = HashSet::new();
        for operation in &self.operations {
            if !seen.insert(operation.schema_name.as_str()) {
                return Err(RunnerError::DuplicateOperations {
                    schema_name: operation.schema_name.clone(),
                });
            }
        }

        Ok(())
    }
}

/// A schema paired with its open store and the state seen when it was
/// opened.
pub(crate) struct SchemaContext {
    pub schema: Arc<Schema>,
    pub store: Arc<dyn Store>,
    pub initial_version: SchemaVersion,
}

#[derive(Clone)]
pub struct Runner {
    registry: Arc<SchemaRegistry>,
    store_factories: Arc<HashMap<String, Arc<dyn StoreFactory>>>,
    lock_poll_interval: Duration,
    index_poll_interval: Duration,
}

impl Runner {
    /// `store_factories` is keyed by schema name.
    pub fn new(
        registry: SchemaRegistry,
        store_factories: HashMap<String, Arc<dyn StoreFactory>>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            store_factories: Arc::new(store_factories),
            lock_poll_interval: LOCK_POLL_INTERVAL,
            index_poll_interval: INDEX_POLL_INTERVAL,
        }
    }

    pub fn with_poll_intervals(mut self, lock: Duration, index: Duration) -> Self {
        self.lock_poll_interval = lock;
        self.index_poll_interval = index;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    fn schema(&self, schema_name: &str) -> Result<Arc<Schema>, RunnerError> {
        self.registry
            .get(schema_name)
            .ok_or_else(|| RunnerError::UnknownSchema {
                schema_name: schema_name.to_string(),
            })
    }

    /// Open the store of one schema.
    pub async fn store(&self, schema_name: &str) -> Result<Arc<dyn Store>> {
        let schema = self.schema(schema_name)?;
        let factory = self
            .store_factories
            .get(schema_name)
            .ok_or_else(|| RunnerError::UnknownSchema {
                schema_name: schema_name.to_string(),
            })?;
        factory
            .open(&schema)
            .await
            .with_context(|| format!("failed to open store for schema {:?}", schema_name))
    }

    /// Live descriptions of the database backing one schema.
    pub async fn describe(&self, schema_name: &str) -> Result<BTreeMap<String, SchemaDescription>> {
        let store = self.store(schema_name).await?;
        store.describe().await
    }

    async fn open_context(&self, schema_name: &str) -> Result<SchemaContext> {
        let schema = self.schema(schema_name)?;
        let store = self.store(schema_name).await?;
        let initial_version = store
            .versions()
            .await
            .with_context(|| format!("failed to read migration state of schema {:?}", schema_name))?;

        Ok(SchemaContext {
            schema,
            store,
            initial_version,
        })
    }

    /// Run every operation in `options`. Each schema is processed
    /// independently and all failures are returned together.
    pub async fn run(&self, cancel: &CancellationToken, options: Options) -> Result<()> {
        options.validate()?;
        for operation in &options.operations {
            self.schema(&operation.schema_name)?;
        }

        let options = Arc::new(options);
        let permits = if options.parallel {
            options.operations.len().max(1)
        } else {
            1
        };
        let semaphore = Arc::new(Semaphore::new(permits));

        let mut tasks = JoinSet::new();
        for operation in options.operations.iter().cloned() {
            let runner = self.clone();
            let cancel = cancel.clone();
            let options = Arc::clone(&options);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let schema_name = operation.schema_name.clone();
                let result: Result<()> = async {
                    let _permit = semaphore.acquire_owned().await?;
                    let ctx = runner.open_context(&schema_name).await?;
                    runner.run_schema(&cancel, &ctx, &operation, &options).await
                }
                .await;
                let result = result
                    .with_context(|| format!("failed to run migration for schema {:?}", schema_name));
                (schema_name, result)
            });
        }

        collect_errors(tasks).await
    }

    async fn run_schema(
        &self,
        cancel: &CancellationToken,
        ctx: &SchemaContext,
        operation: &MigrationOperation,
        options: &Options,
    ) -> Result<()> {
        let schema_name = &ctx.schema.name;
        let targeted = desugar_operation(&ctx.schema, &ctx.initial_version, operation)?;
        let definitions =
            targeted.definitions(&ctx.schema, &ctx.initial_version.applied_versions)?;

        let by_state = group_by_state(&ctx.initial_version, &definitions);
        log_by_state(schema_name, &ctx.initial_version, &by_state);

        if is_up_to_date(targeted.direction, &by_state, &definitions) {
            info!(schema = %schema_name, "Schema is up to date");
            return Ok(());
        }

        loop {
            match self
                .apply_migrations(cancel, ctx, &targeted, &definitions, options)
                .await?
            {
                ApplyCycle::Done => break,
                ApplyCycle::NeedsRetry => {
                    debug!(schema = %schema_name, "Retrying after releasing the migration lock");
                    wait(cancel, self.index_poll_interval).await?;
                }
            }
        }

        info!(schema = %schema_name, "Migrated schema");
        Ok(())
    }
}

/// Await every schema task and aggregate the failures, ordered by schema
/// name.
pub(crate) async fn collect_errors(mut tasks: JoinSet<(String, Result<()>)>) -> Result<()> {
    let mut errors = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((schema_name, Err(e))) => errors.push((schema_name, e)),
            Err(e) => errors.push((String::new(), anyhow::Error::new(e).context("schema task panicked"))),
        }
    }
    errors.sort_by(|a, b| a.0.cmp(&b.0));

    match MultiError::aggregate(errors.into_iter().map(|(_, e)| e).collect()) {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Sleep for `duration` unless cancelled first.
pub(crate) async fn wait(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(RunnerError::Cancelled.into()),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
