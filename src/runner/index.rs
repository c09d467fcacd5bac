use super::lock::LockGuard;
use super::wait;
use crate::definition::Definition;
use crate::store::{IndexStatus, Store, is_duplicate_object};
use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Build the index of a `CREATE INDEX CONCURRENTLY` definition.
///
/// The schema lock is released before the build starts so other processes
/// are not blocked for its duration; the caller inspects the guard to learn
/// whether the lock is still held. The definition is logged as applied once
/// the index exists and is valid, whoever built it.
pub(crate) async fn create_index_concurrently(
    cancel: &CancellationToken,
    store: &Arc<dyn Store>,
    guard: &mut LockGuard,
    definition: &Definition,
    applied: &[i64],
    poll_interval: Duration,
) -> Result<()> {
    let metadata = definition.index_metadata.as_ref().ok_or_else(|| {
        anyhow!(
            "migration {} creates an index concurrently but names no index",
            definition.id
        )
    })?;

    loop {
        let status = store
            .index_status(&metadata.table_name, &metadata.index_name)
            .await?;

        match status {
            Some(status) if status.is_valid => {
                if !applied.contains(&definition.id) {
                    // Built by another process, or before an interrupted run.
                    store
                        .with_migration_log(definition, true, Box::pin(async { Ok(()) }))
                        .await?;
                }
                return Ok(());
            }
            Some(status) if !status.is_building() => {
                info!(
                    index = %metadata.index_name,
                    "Dropping invalid index left behind by an earlier build"
                );
                let tx = store.transact().await?;
                let result = tx.down(definition).await;
                tx.done(result)
                    .await
                    .with_context(|| format!("failed to drop invalid index {}", metadata.index_name))?;
            }
            Some(status) => {
                guard.release().await?;
                log_progress(&metadata.index_name, &status);
                wait(cancel, poll_interval).await?;
                continue;
            }
            None => {}
        }

        guard.release().await?;

        let progress = cancel.child_token();
        let reporter = tokio::spawn(report_progress(
            progress.clone(),
            Arc::clone(store),
            metadata.table_name.clone(),
            metadata.index_name.clone(),
            poll_interval,
        ));

        let result = store
            .with_migration_log(definition, true, store.up(definition))
            .await;

        progress.cancel();
        if let Err(e) = reporter.await {
            warn!("Index progress reporter failed: {}", e);
        }

        match result {
            Ok(()) => return Ok(()),
            Err(e) if is_duplicate_object(&e) => {
                info!(
                    index = %metadata.index_name,
                    "Index is being created by another process"
                );
            }
            Err(e) => return Err(e),
        }
    }
}

async fn report_progress(
    cancel: CancellationToken,
    store: Arc<dyn Store>,
    table_name: String,
    index_name: String,
    poll_interval: Duration,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(poll_interval) => {}
        }

        match store.index_status(&table_name, &index_name).await {
            Ok(Some(status)) if status.is_building() => log_progress(&index_name, &status),
            Ok(_) => {}
            Err(e) => warn!(index = %index_name, "Failed to read index progress: {:#}", e),
        }
    }
}

fn log_progress(index_name: &str, status: &IndexStatus) {
    info!(
        index = %index_name,
        phase = status.phase.as_deref().unwrap_or("unknown"),
        lockers = %fraction(status.lockers_done, status.lockers_total),
        blocks = %fraction(status.blocks_done, status.blocks_total),
        tuples = %fraction(status.tuples_done, status.tuples_total),
        "Index build in progress"
    );
}

fn fraction(done: Option<i64>, total: Option<i64>) -> String {
    match (done, total) {
        (Some(done), Some(total)) if total > 0 => {
            format!("{}/{} ({:.0}%)", done, total, done as f64 / total as f64 * 100.0)
        }
        (Some(done), Some(total)) => format!("{}/{}", done, total),
        _ => "-".to_string(),
    }
}
