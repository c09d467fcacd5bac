use super::desugar::{Direction, TargetedOperation};
use super::errors::RunnerError;
use super::index::create_index_concurrently;
use super::lock::{LockGuard, acquire_lock};
use super::privileged::check_privileged_state;
use super::state::{DefinitionsByState, group_by_state, ids};
use super::{Options, PrivilegedMode, Runner, SchemaContext};
use crate::definition::Definition;
use crate::store::{SchemaVersion, Store};
use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome of one locked apply cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ApplyCycle {
    /// The lock was given up before the work was finished; state must be
    /// re-read under a new lock.
    NeedsRetry,
    Done,
}

impl Runner {
    /// Take the schema lock and apply as much of `operation` as possible.
    pub(crate) async fn apply_migrations(
        &self,
        cancel: &CancellationToken,
        ctx: &SchemaContext,
        operation: &TargetedOperation,
        definitions: &[Definition],
        options: &Options,
    ) -> Result<ApplyCycle> {
        let mut guard = acquire_lock(
            cancel,
            ctx.store.as_ref(),
            &ctx.schema.name,
            self.lock_poll_interval,
        )
        .await?;

        let result = self
            .apply_locked(cancel, ctx, &mut guard, operation, definitions, options)
            .await;
        release_after(&mut guard, &ctx.schema.name, result).await
    }

    async fn apply_locked(
        &self,
        cancel: &CancellationToken,
        ctx: &SchemaContext,
        guard: &mut LockGuard,
        operation: &TargetedOperation,
        definitions: &[Definition],
        options: &Options,
    ) -> Result<ApplyCycle> {
        let schema_name = &ctx.schema.name;
        let version = ctx.store.versions().await?;
        let by_state = group_by_state(&version, definitions);
        let remaining = operation.definitions(&ctx.schema, &version.applied_versions)?;

        let state = validate_schema_state(ctx, &by_state, &remaining, options).await?;
        if state == ApplyCycle::NeedsRetry {
            return Ok(ApplyCycle::NeedsRetry);
        }

        check_privileged_state(schema_name, operation.direction, &remaining, options)?;

        for definition in &remaining {
            if cancel.is_cancelled() {
                return Err(RunnerError::Cancelled.into());
            }

            if operation.direction.is_up() && definition.is_create_index_concurrently {
                create_index_concurrently(
                    cancel,
                    &ctx.store,
                    guard,
                    definition,
                    &version.applied_versions,
                    self.index_poll_interval,
                )
                .await
                .with_context(|| format!("failed to create index for migration {}", definition.id))?;

                if !guard.is_held() {
                    return Ok(ApplyCycle::NeedsRetry);
                }
                continue;
            }

            let noop = options.privileged_mode == PrivilegedMode::Noop && definition.privileged;
            apply_definition(ctx.store.as_ref(), definition, operation.direction, noop).await?;
        }

        Ok(ApplyCycle::Done)
    }
}

/// Release the lock once the locked scope ends, keeping the scope's error
/// when both fail.
pub(crate) async fn release_after<T>(
    guard: &mut LockGuard,
    schema_name: &str,
    result: Result<T>,
) -> Result<T> {
    let released = guard.release().await;
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(release_err)) => {
            warn!(schema = %schema_name, "Failed to release migration lock: {:#}", release_err);
            Err(e)
        }
    }
}

/// Reject failed and unfinished migrations, except those the options allow
/// to be skipped and index builds still running elsewhere.
pub(crate) async fn validate_schema_state(
    ctx: &SchemaContext,
    by_state: &DefinitionsByState,
    remaining: &[Definition],
    options: &Options,
) -> Result<ApplyCycle> {
    let schema_name = &ctx.schema.name;
    let mut failed = by_state.failed.clone();
    let mut pending = by_state.pending.clone();

    if options.ignore_single_dirty_log
        && let [single] = failed.as_slice()
        && remaining.first().map(|d| d.id) == Some(single.id)
    {
        info!(schema = %schema_name, migration = single.id, "Retrying failed migration");
        failed.clear();
    }

    if options.ignore_single_pending_log && pending.len() == 1 {
        info!(
            schema = %schema_name,
            migration = pending[0].id,
            "Resuming unfinished migration"
        );
        pending.clear();
    }

    if !failed.is_empty() {
        return Err(RunnerError::DirtySchema {
            schema_name: schema_name.clone(),
            definition_ids: ids(&failed),
        }
        .into());
    }

    let mut building = Vec::new();
    let mut dirty = Vec::new();
    for definition in pending {
        if is_index_building(ctx.store.as_ref(), &definition).await? {
            building.push(definition.id);
        } else {
            dirty.push(definition.id);
        }
    }

    if !dirty.is_empty() {
        return Err(RunnerError::DirtySchema {
            schema_name: schema_name.clone(),
            definition_ids: dirty,
        }
        .into());
    }

    if !building.is_empty() {
        info!(
            schema = %schema_name,
            migrations = ?building,
            "Waiting for index builds started by another process"
        );
        return Ok(ApplyCycle::NeedsRetry);
    }

    Ok(ApplyCycle::Done)
}

async fn is_index_building(store: &dyn Store, definition: &Definition) -> Result<bool> {
    if !definition.is_create_index_concurrently {
        return Ok(false);
    }
    let Some(metadata) = &definition.index_metadata else {
        return Ok(false);
    };

    let status = store
        .index_status(&metadata.table_name, &metadata.index_name)
        .await?;
    Ok(status.is_some_and(|s| s.is_building()))
}

/// Apply or unapply one definition in its own transaction, logging the
/// attempt. A noop definition is logged without running its SQL.
pub(crate) async fn apply_definition(
    store: &dyn Store,
    definition: &Definition,
    direction: Direction,
    noop: bool,
) -> Result<()> {
    if noop {
        info!(migration = definition.id, "Recording privileged migration without running it");
    } else {
        info!(migration = definition.id, "Running {} of {}", direction.verb(), definition.name);
    }

    let body: BoxFuture<'_, Result<()>> = if noop {
        Box::pin(async { Ok(()) })
    } else {
        Box::pin(async move {
            let tx = store.transact().await?;
            let result = match direction {
                Direction::Up => tx.up(definition).await,
                Direction::Down => tx.down(definition).await,
            };
            tx.done(result).await
        })
    };

    store
        .with_migration_log(definition, direction.is_up(), body)
        .await
        .with_context(|| format!("failed to {} migration {}", direction.verb(), definition.id))?;

    debug!(migration = definition.id, "Finished {}", direction.verb());
    Ok(())
}

/// Whether the current snapshot already satisfies the operation.
pub(crate) fn is_up_to_date(
    direction: Direction,
    by_state: &DefinitionsByState,
    definitions: &[Definition],
) -> bool {
    if !by_state.pending.is_empty() || !by_state.failed.is_empty() {
        return false;
    }

    match direction {
        Direction::Up => by_state.applied.len() == definitions.len(),
        Direction::Down => by_state.applied.is_empty(),
    }
}

pub(crate) fn log_by_state(schema_name: &str, version: &SchemaVersion, by_state: &DefinitionsByState) {
    debug!(
        schema = %schema_name,
        applied = ?ids(&by_state.applied),
        pending = ?ids(&by_state.pending),
        failed = ?ids(&by_state.failed),
        total_applied = version.applied_versions.len(),
        "Checked schema state"
    );
}
