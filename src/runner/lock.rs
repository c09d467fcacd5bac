use super::errors::RunnerError;
use super::wait;
use crate::constants::LOCK_POLL_LOG_RATIO;
use crate::store::{AdvisoryLock, Store};
use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A held schema lock. Released explicitly with [`LockGuard::release`];
/// a guard dropped while still holding the lock releases it in the
/// background.
pub(crate) struct LockGuard {
    schema_name: String,
    lock: Option<Box<dyn AdvisoryLock>>,
}

impl LockGuard {
    pub(crate) fn is_held(&self) -> bool {
        self.lock.is_some()
    }

    /// Release the lock. Releasing twice is a no-op.
    pub(crate) async fn release(&mut self) -> Result<()> {
        let Some(lock) = self.lock.take() else {
            return Ok(());
        };
        lock.release().await?;
        debug!(schema = %self.schema_name, "Released migration lock");
        Ok(())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(lock) = self.lock.take() else {
            return;
        };
        let schema_name = self.schema_name.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = lock.release().await {
                        warn!(schema = %schema_name, "Failed to release migration lock: {:#}", e);
                    }
                });
            }
            Err(_) => warn!(schema = %schema_name, "Migration lock dropped outside of a runtime"),
        }
    }
}

/// Poll until the schema's advisory lock is held.
pub(crate) async fn acquire_lock(
    cancel: &CancellationToken,
    store: &dyn Store,
    schema_name: &str,
    poll_interval: Duration,
) -> Result<LockGuard> {
    let mut attempts: usize = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(RunnerError::Cancelled.into());
        }

        if let Some(lock) = store.try_lock().await? {
            debug!(schema = %schema_name, "Acquired migration lock");
            return Ok(LockGuard {
                schema_name: schema_name.to_string(),
                lock: Some(lock),
            });
        }

        attempts += 1;
        if attempts % LOCK_POLL_LOG_RATIO == 0 {
            info!(
                schema = %schema_name,
                attempts,
                "Waiting for another process to release the migration lock"
            );
        }
        wait(cancel, poll_interval).await?;
    }
}
