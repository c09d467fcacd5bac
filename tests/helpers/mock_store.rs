//! In-memory [`Store`] that records every call the runner makes.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use schemaflow::definition::{Definition, Definitions, IndexMetadata};
use schemaflow::runner::Runner;
use schemaflow::schema::SchemaDescription;
use schemaflow::schemas::{Schema, SchemaRegistry};
use schemaflow::store::{
    AdvisoryLock, IndexStatus, SchemaVersion, SqlErrorContext, Store, StoreFactory,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const LOCK_POLL: Duration = Duration::from_millis(1);
pub const INDEX_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub version: i64,
    pub up: bool,
    pub success: Option<bool>,
    pub error_message: Option<String>,
}

#[derive(Default)]
pub struct MockState {
    pub logs: Vec<LogEntry>,
    pub up_calls: Vec<i64>,
    pub down_calls: Vec<i64>,
    pub ddl_statements: Vec<String>,

    pub try_lock_calls: usize,
    pub locks_acquired: usize,
    pub unlock_calls: usize,
    pub locked: bool,
    /// Deny this many `try_lock` attempts before granting the lock
    pub deny_locks: usize,

    pub transactions: usize,
    pub commits: usize,
    pub rollbacks: usize,

    /// One-shot failures returned by `up`
    pub up_errors: HashMap<i64, SqlErrorContext>,
    /// Scripted index states by index name; the last entry repeats
    pub index_statuses: HashMap<String, Vec<Option<IndexStatus>>>,
    pub description: BTreeMap<String, SchemaDescription>,
}

#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<MockState>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Seed a finished log entry.
    pub fn with_log(self, version: i64, up: bool, success: Option<bool>) -> Self {
        self.state().logs.push(LogEntry {
            version,
            up,
            success,
            error_message: None,
        });
        self
    }

    pub fn with_applied(self, versions: &[i64]) -> Self {
        versions
            .iter()
            .fold(self, |store, version| store.with_log(*version, true, Some(true)))
    }

    pub fn with_up_error(self, version: i64, code: &str, message: &str) -> Self {
        self.state().up_errors.insert(
            version,
            SqlErrorContext {
                message: message.to_string(),
                code: Some(code.to_string()),
                ..Default::default()
            },
        );
        self
    }

    pub fn with_index_statuses(self, index_name: &str, statuses: Vec<Option<IndexStatus>>) -> Self {
        self.state()
            .index_statuses
            .insert(index_name.to_string(), statuses);
        self
    }

    pub fn with_denied_locks(self, count: usize) -> Self {
        self.state().deny_locks = count;
        self
    }

    /// Latest log entry of one version.
    pub fn latest_log(&self, version: i64) -> Option<LogEntry> {
        self.state()
            .logs
            .iter()
            .rev()
            .find(|entry| entry.version == version)
            .cloned()
    }

    pub fn applied(&self) -> Vec<i64> {
        compute_versions(&self.state().logs).applied_versions
    }
}

fn compute_versions(logs: &[LogEntry]) -> SchemaVersion {
    let mut latest: BTreeMap<i64, &LogEntry> = BTreeMap::new();
    for entry in logs {
        latest.insert(entry.version, entry);
    }

    let mut version = SchemaVersion::default();
    for (id, entry) in latest {
        match entry.success {
            None => version.pending_versions.push(id),
            Some(false) => version.failed_versions.push(id),
            Some(true) if entry.up => version.applied_versions.push(id),
            Some(true) => {}
        }
    }
    version
}

pub fn valid_index() -> Option<IndexStatus> {
    Some(IndexStatus {
        is_valid: true,
        ..Default::default()
    })
}

pub fn invalid_index() -> Option<IndexStatus> {
    Some(IndexStatus::default())
}

pub fn building_index() -> Option<IndexStatus> {
    Some(IndexStatus {
        phase: Some("building index: scanning table".to_string()),
        blocks_done: Some(10),
        blocks_total: Some(100),
        ..Default::default()
    })
}

#[async_trait]
impl Store for MockStore {
    async fn transact(&self) -> Result<Box<dyn Store>> {
        self.state().transactions += 1;
        Ok(Box::new(self.clone()))
    }

    async fn done(self: Box<Self>, result: Result<()>) -> Result<()> {
        {
            let mut state = self.state();
            if result.is_ok() {
                state.commits += 1;
            } else {
                state.rollbacks += 1;
            }
        }
        result
    }

    async fn versions(&self) -> Result<SchemaVersion> {
        Ok(compute_versions(&self.state().logs))
    }

    async fn run_ddl_statements(&self, statements: &[String]) -> Result<()> {
        self.state().ddl_statements.extend_from_slice(statements);
        Ok(())
    }

    async fn try_lock(&self) -> Result<Option<Box<dyn AdvisoryLock>>> {
        let mut state = self.state();
        state.try_lock_calls += 1;
        if state.deny_locks > 0 {
            state.deny_locks -= 1;
            return Ok(None);
        }
        if state.locked {
            return Ok(None);
        }

        state.locked = true;
        state.locks_acquired += 1;
        let lock: Box<dyn AdvisoryLock> = Box::new(MockLock {
            state: Arc::clone(&self.state),
        });
        Ok(Some(lock))
    }

    async fn up(&self, definition: &Definition) -> Result<()> {
        let mut state = self.state();
        state.up_calls.push(definition.id);

        if let Some(err) = state.up_errors.remove(&definition.id) {
            return Err(anyhow::Error::new(err)
                .context(format!("failed to apply migration {}", definition.id)));
        }

        if let Some(metadata) = &definition.index_metadata {
            state
                .index_statuses
                .insert(metadata.index_name.clone(), vec![valid_index()]);
        }
        Ok(())
    }

    async fn down(&self, definition: &Definition) -> Result<()> {
        let mut state = self.state();
        state.down_calls.push(definition.id);
        if let Some(metadata) = &definition.index_metadata {
            state.index_statuses.remove(&metadata.index_name);
        }
        Ok(())
    }

    async fn with_migration_log<'a>(
        &'a self,
        definition: &'a Definition,
        up: bool,
        body: BoxFuture<'a, Result<()>>,
    ) -> Result<()> {
        let position = {
            let mut state = self.state();
            state.logs.push(LogEntry {
                version: definition.id,
                up,
                success: None,
                error_message: None,
            });
            state.logs.len() - 1
        };

        let result = body.await;

        {
            let mut state = self.state();
            let entry = &mut state.logs[position];
            entry.success = Some(result.is_ok());
            entry.error_message = result.as_ref().err().map(|e| format!("{:#}", e));
        }
        result
    }

    async fn index_status(
        &self,
        _table_name: &str,
        index_name: &str,
    ) -> Result<Option<IndexStatus>> {
        let mut state = self.state();
        let Some(statuses) = state.index_statuses.get_mut(index_name) else {
            return Ok(None);
        };
        if statuses.len() > 1 {
            Ok(statuses.remove(0))
        } else {
            Ok(statuses.first().cloned().flatten())
        }
    }

    async fn describe(&self) -> Result<BTreeMap<String, SchemaDescription>> {
        Ok(self.state().description.clone())
    }
}

struct MockLock {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl AdvisoryLock for MockLock {
    async fn release(self: Box<Self>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.locked {
            return Err(anyhow!("lock was not held"));
        }
        state.locked = false;
        state.unlock_calls += 1;
        Ok(())
    }
}

pub struct MockStoreFactory {
    store: MockStore,
}

#[async_trait]
impl StoreFactory for MockStoreFactory {
    async fn open(&self, _schema: &Schema) -> Result<Arc<dyn Store>> {
        let store: Arc<dyn Store> = Arc::new(self.store.clone());
        Ok(store)
    }
}

pub fn definition(id: i64, parents: &[i64]) -> Definition {
    Definition {
        id,
        name: format!("migration {}", id),
        up_query: format!("-- up {}", id),
        down_query: format!("-- down {}", id),
        privileged: false,
        parents: parents.to_vec(),
        is_create_index_concurrently: false,
        index_metadata: None,
    }
}

pub fn privileged(id: i64, parents: &[i64]) -> Definition {
    Definition {
        privileged: true,
        ..definition(id, parents)
    }
}

pub fn concurrent_index(id: i64, parents: &[i64], index_name: &str) -> Definition {
    Definition {
        up_query: format!("CREATE INDEX CONCURRENTLY {} ON users (email);", index_name),
        down_query: format!("DROP INDEX IF EXISTS {};", index_name),
        is_create_index_concurrently: true,
        index_metadata: Some(IndexMetadata {
            table_name: "users".to_string(),
            index_name: index_name.to_string(),
        }),
        ..definition(id, parents)
    }
}

/// A linear chain `ids[0] -> ids[1] -> ...`.
pub fn chain(ids: &[i64]) -> Vec<Definition> {
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let parents: Vec<i64> = if i == 0 { vec![] } else { vec![ids[i - 1]] };
            definition(*id, &parents)
        })
        .collect()
}

pub fn schema(name: &str, definitions: Vec<Definition>) -> Schema {
    Schema::new(name, "migration_logs", Definitions::new(definitions).unwrap())
}

/// A runner over the given schemas, each backed by its mock store.
pub fn runner(schemas: Vec<(Schema, MockStore)>) -> Runner {
    let mut factories: HashMap<String, Arc<dyn StoreFactory>> = HashMap::new();
    let mut registered = Vec::new();
    for (schema, store) in schemas {
        factories.insert(schema.name.clone(), Arc::new(MockStoreFactory { store }));
        registered.push(schema);
    }

    Runner::new(SchemaRegistry::new(registered).unwrap(), factories)
        .with_poll_intervals(LOCK_POLL, INDEX_POLL)
}
