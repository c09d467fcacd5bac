use super::apply::{ApplyCycle, is_up_to_date, release_after, validate_schema_state};
use super::desugar::desugar_operation;
use super::errors::RunnerError;
use super::lock::acquire_lock;
use super::state::{group_by_state, ids};
use super::{MigrationOperation, Options, Runner, SchemaContext, collect_errors, wait};
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

impl Runner {
    /// Check that every named schema has all of its migrations applied.
    pub async fn validate(&self, cancel: &CancellationToken, schema_names: &[String]) -> Result<()> {
        let schema_names: BTreeSet<&String> = schema_names.iter().collect();
        for schema_name in &schema_names {
            self.schema(schema_name)?;
        }

        let mut tasks = JoinSet::new();
        for schema_name in schema_names {
            let runner = self.clone();
            let cancel = cancel.clone();
            let schema_name = schema_name.clone();
            tasks.spawn(async move {
                let result: Result<()> = async {
                    let ctx = runner.open_context(&schema_name).await?;
                    runner.validate_schema(&cancel, &ctx).await
                }
                .await;
                let result =
                    result.with_context(|| format!("failed to validate schema {:?}", schema_name));
                (schema_name, result)
            });
        }

        collect_errors(tasks).await
    }

    async fn validate_schema(&self, cancel: &CancellationToken, ctx: &SchemaContext) -> Result<()> {
        let schema_name = &ctx.schema.name;
        let operation = desugar_operation(
            &ctx.schema,
            &ctx.initial_version,
            &MigrationOperation::upgrade(schema_name.as_str()),
        )?;
        let definitions =
            operation.definitions(&ctx.schema, &ctx.initial_version.applied_versions)?;

        let by_state = group_by_state(&ctx.initial_version, &definitions);
        if is_up_to_date(operation.direction, &by_state, &definitions) {
            info!(schema = %schema_name, "Schema is up to date");
            return Ok(());
        }

        // Missing migrations may be in flight in another process; only the
        // state seen under the lock is authoritative.
        let options = Options::default();
        loop {
            let mut guard = acquire_lock(
                cancel,
                ctx.store.as_ref(),
                schema_name,
                self.lock_poll_interval,
            )
            .await?;

            let result: Result<ApplyCycle> = async {
                let version = ctx.store.versions().await?;
                let by_state = group_by_state(&version, &definitions);
                let remaining = operation.definitions(&ctx.schema, &version.applied_versions)?;

                if validate_schema_state(ctx, &by_state, &remaining, &options).await?
                    == ApplyCycle::NeedsRetry
                {
                    return Ok(ApplyCycle::NeedsRetry);
                }

                if !remaining.is_empty() {
                    return Err(RunnerError::SchemaOutOfDate {
                        schema_name: schema_name.clone(),
                        missing_ids: ids(&remaining),
                    }
                    .into());
                }
                Ok(ApplyCycle::Done)
            }
            .await;

            match release_after(&mut guard, schema_name, result).await? {
                ApplyCycle::Done => break,
                ApplyCycle::NeedsRetry => {
                    debug!(schema = %schema_name, "Waiting before validating again");
                    wait(cancel, self.index_poll_interval).await?;
                }
            }
        }

        info!(schema = %schema_name, "Schema is up to date");
        Ok(())
    }
}
