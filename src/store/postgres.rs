use super::describe::describe_schemas;
use super::error_context::SqlErrorContext;
use super::{AdvisoryLock, IndexStatus, SchemaVersion, Store, StoreFactory};
use crate::constants::MIGRATION_LOGS_SCHEMA_VERSION;
use crate::definition::Definition;
use crate::schema::SchemaDescription;
use crate::schema::sql::quote_ident;
use crate::schemas::Schema;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection, Executor, PgConnection, PgPool, Row};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Mask the password in a database URL for display
pub fn mask_url_password(url: &str) -> String {
    let Some((protocol, rest)) = url.split_once("://") else {
        return url.to_string();
    };

    if let Some((user_info, host_and_path)) = rest.split_once('@')
        && let Some((username, _)) = user_info.split_once(':')
    {
        return format!("{}://{}:***@{}", protocol, username, host_and_path);
    }

    url.to_string()
}

/// PostgreSQL-backed [`Store`] for one schema.
///
/// Migrations, transactions and the advisory lock all run on one dedicated
/// session connection, since advisory locks belong to the session that took
/// them. Index progress and introspection use the pool.
#[derive(Clone)]
pub struct PostgresStore {
    schema_name: String,
    migrations_table: String,
    pool: PgPool,
    session: Arc<Mutex<PgConnection>>,
    depth: usize,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, schema: &Schema) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to database for schema {:?} at {}",
                    schema.name,
                    mask_url_password(database_url)
                )
            })?;
        let session = PgConnection::connect(database_url)
            .await
            .with_context(|| format!("Failed to open session at {}", mask_url_password(database_url)))?;

        let store = Self {
            schema_name: schema.name.clone(),
            migrations_table: quote_ident(&schema.migrations_table_name),
            pool,
            session: Arc::new(Mutex::new(session)),
            depth: 0,
        };
        store.ensure_migration_logs_table().await?;
        Ok(store)
    }

    async fn ensure_migration_logs_table(&self) -> Result<()> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id SERIAL PRIMARY KEY,
                migration_logs_schema_version INTEGER NOT NULL,
                schema TEXT NOT NULL,
                version BIGINT NOT NULL,
                up BOOLEAN NOT NULL,
                started_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                finished_at TIMESTAMPTZ,
                success BOOLEAN,
                error_message TEXT
            )
            "#,
            self.migrations_table
        );

        self.execute(&sql).await.with_context(|| {
            format!(
                "Failed to create migration log table {}",
                self.migrations_table
            )
        })
    }

    /// Run (possibly multi-statement) SQL on the session connection.
    async fn execute(&self, sql: &str) -> Result<()> {
        let mut conn = self.session.lock().await;
        conn.execute(sqlx::raw_sql(sql))
            .await
            .map_err(|e| SqlErrorContext::from_sqlx_error(&e, sql))?;
        Ok(())
    }

    fn lock_key(&self) -> String {
        format!("{}:migrations", self.schema_name)
    }

    fn savepoint(&self, depth: usize) -> String {
        format!("schemaflow_savepoint_{}", depth)
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn transact(&self) -> Result<Box<dyn Store>> {
        let statement = if self.depth == 0 {
            "BEGIN".to_string()
        } else {
            format!("SAVEPOINT {}", self.savepoint(self.depth))
        };
        self.execute(&statement).await?;

        let transaction: Box<dyn Store> = Box::new(Self {
            depth: self.depth + 1,
            ..self.clone()
        });
        Ok(transaction)
    }

    async fn done(self: Box<Self>, result: Result<()>) -> Result<()> {
        if self.depth == 0 {
            return result;
        }

        let parent = self.depth - 1;
        match result {
            Ok(()) => {
                let statement = if parent == 0 {
                    "COMMIT".to_string()
                } else {
                    format!("RELEASE SAVEPOINT {}", self.savepoint(parent))
                };
                self.execute(&statement).await
            }
            Err(err) => {
                let statement = if parent == 0 {
                    "ROLLBACK".to_string()
                } else {
                    format!("ROLLBACK TO SAVEPOINT {}", self.savepoint(parent))
                };
                if let Err(rollback_err) = self.execute(&statement).await {
                    warn!("Failed to roll back transaction: {:#}", rollback_err);
                }
                Err(err)
            }
        }
    }

    async fn versions(&self) -> Result<SchemaVersion> {
        let sql = format!(
            r#"
            WITH ranked AS (
                SELECT
                    version,
                    up,
                    success,
                    ROW_NUMBER() OVER (PARTITION BY version ORDER BY started_at DESC, id DESC) AS rank
                FROM {}
                WHERE schema = $1
            )
            SELECT version, up, success FROM ranked WHERE rank = 1 ORDER BY version
            "#,
            self.migrations_table
        );

        let rows = {
            let mut conn = self.session.lock().await;
            sqlx::query_as::<_, (i64, bool, Option<bool>)>(&sql)
                .bind(&self.schema_name)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| SqlErrorContext::from_sqlx_error(&e, &sql))?
        };

        let mut version = SchemaVersion::default();
        for (id, up, success) in rows {
            match success {
                None => version.pending_versions.push(id),
                Some(false) => version.failed_versions.push(id),
                Some(true) if up => version.applied_versions.push(id),
                Some(true) => {}
            }
        }

        Ok(version)
    }

    async fn run_ddl_statements(&self, statements: &[String]) -> Result<()> {
        for statement in statements {
            debug!(schema = %self.schema_name, "Executing {}", statement);
            self.execute(statement).await?;
        }
        Ok(())
    }

    async fn try_lock(&self) -> Result<Option<Box<dyn AdvisoryLock>>> {
        let key = self.lock_key();
        let acquired: bool = {
            let mut conn = self.session.lock().await;
            sqlx::query_scalar("SELECT pg_try_advisory_lock(hashtext($1))")
                .bind(&key)
                .fetch_one(&mut *conn)
                .await
                .context("Failed to request advisory lock")?
        };

        if !acquired {
            return Ok(None);
        }

        let lock: Box<dyn AdvisoryLock> = Box::new(PostgresAdvisoryLock {
            session: Arc::clone(&self.session),
            key,
        });
        Ok(Some(lock))
    }

    async fn up(&self, definition: &Definition) -> Result<()> {
        self.execute(&definition.up_query)
            .await
            .with_context(|| format!("failed to apply migration {}", definition.id))
    }

    async fn down(&self, definition: &Definition) -> Result<()> {
        self.execute(&definition.down_query)
            .await
            .with_context(|| format!("failed to unapply migration {}", definition.id))
    }

    async fn with_migration_log<'a>(
        &'a self,
        definition: &'a Definition,
        up: bool,
        body: BoxFuture<'a, Result<()>>,
    ) -> Result<()> {
        let insert = format!(
            r#"
            INSERT INTO {} (migration_logs_schema_version, schema, version, up)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
            self.migrations_table
        );
        let log_id: i32 = {
            let mut conn = self.session.lock().await;
            sqlx::query_scalar(&insert)
                .bind(MIGRATION_LOGS_SCHEMA_VERSION)
                .bind(&self.schema_name)
                .bind(definition.id)
                .bind(up)
                .fetch_one(&mut *conn)
                .await
                .with_context(|| format!("Failed to log start of migration {}", definition.id))?
        };

        let result = body.await;

        let update = format!(
            r#"
            UPDATE {}
            SET finished_at = now(), success = $2, error_message = $3
            WHERE id = $1
            "#,
            self.migrations_table
        );
        let error_message = result.as_ref().err().map(|e| format!("{:#}", e));
        {
            let mut conn = self.session.lock().await;
            sqlx::query(&update)
                .bind(log_id)
                .bind(result.is_ok())
                .bind(error_message)
                .execute(&mut *conn)
                .await
                .with_context(|| format!("Failed to log end of migration {}", definition.id))?;
        }

        result
    }

    async fn index_status(
        &self,
        table_name: &str,
        index_name: &str,
    ) -> Result<Option<IndexStatus>> {
        let row = sqlx::query(
            r#"
            SELECT
                ix.indisvalid,
                p.phase::text AS phase,
                p.lockers_done,
                p.lockers_total,
                p.blocks_done,
                p.blocks_total,
                p.tuples_done,
                p.tuples_total
            FROM pg_catalog.pg_index ix
            JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
            JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = i.relnamespace
            LEFT JOIN pg_catalog.pg_stat_progress_create_index p
                ON p.relid = t.oid AND p.index_relid = i.oid
            WHERE n.nspname = current_schema() AND t.relname = $1 AND i.relname = $2
            "#,
        )
        .bind(table_name)
        .bind(index_name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to query status of index {}", index_name))?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(IndexStatus {
            is_valid: row.try_get("indisvalid")?,
            phase: row.try_get("phase")?,
            lockers_done: row.try_get("lockers_done")?,
            lockers_total: row.try_get("lockers_total")?,
            blocks_done: row.try_get("blocks_done")?,
            blocks_total: row.try_get("blocks_total")?,
            tuples_done: row.try_get("tuples_done")?,
            tuples_total: row.try_get("tuples_total")?,
        }))
    }

    async fn describe(&self) -> Result<BTreeMap<String, SchemaDescription>> {
        describe_schemas(&self.pool)
            .await
            .with_context(|| format!("Failed to describe schema {:?}", self.schema_name))
    }
}

struct PostgresAdvisoryLock {
    session: Arc<Mutex<PgConnection>>,
    key: String,
}

#[async_trait]
impl AdvisoryLock for PostgresAdvisoryLock {
    async fn release(self: Box<Self>) -> Result<()> {
        let mut conn = self.session.lock().await;
        let released: bool = sqlx::query_scalar("SELECT pg_advisory_unlock(hashtext($1))")
            .bind(&self.key)
            .fetch_one(&mut *conn)
            .await
            .context("Failed to release advisory lock")?;

        if released {
            Ok(())
        } else {
            Err(anyhow!("advisory lock {:?} was not held", self.key))
        }
    }
}

/// Opens a [`PostgresStore`] per schema against a fixed database URL.
pub struct PostgresStoreFactory {
    database_url: String,
}

impl PostgresStoreFactory {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
        }
    }
}

#[async_trait]
impl StoreFactory for PostgresStoreFactory {
    async fn open(&self, schema: &Schema) -> Result<Arc<dyn Store>> {
        let store = PostgresStore::connect(&self.database_url, schema).await?;
        Ok(Arc::new(store))
    }
}
