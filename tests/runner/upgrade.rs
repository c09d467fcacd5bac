use crate::helpers::mock_store::{MockStore, chain, definition, runner, schema};
use anyhow::Result;
use schemaflow::runner::{
    MigrationOperation, MultiError, Options, RunnerError, find_runner_error,
};
use tokio_util::sync::CancellationToken;

fn upgrade(schema_names: &[&str]) -> Options {
    Options {
        operations: schema_names
            .iter()
            .map(|name| MigrationOperation::upgrade(*name))
            .collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_upgrade_applies_every_migration_in_order() -> Result<()> {
    let store = MockStore::new();
    let runner = runner(vec![(schema("frontend", chain(&[1, 2, 3])), store.clone())]);

    runner
        .run(&CancellationToken::new(), upgrade(&["frontend"]))
        .await?;

    let state = store.state();
    assert_eq!(state.up_calls, vec![1, 2, 3]);
    assert_eq!(state.transactions, 3);
    assert_eq!(state.commits, 3);
    assert_eq!(state.locks_acquired, 1);
    assert_eq!(state.unlock_calls, 1);
    assert!(!state.locked);
    drop(state);

    assert_eq!(store.applied(), vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_up_to_date_schema_never_takes_the_lock() -> Result<()> {
    let store = MockStore::new().with_applied(&[1, 2, 3]);
    let runner = runner(vec![(schema("frontend", chain(&[1, 2, 3])), store.clone())]);

    runner
        .run(&CancellationToken::new(), upgrade(&["frontend"]))
        .await?;

    let state = store.state();
    assert_eq!(state.try_lock_calls, 0);
    assert!(state.up_calls.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_targeted_up_applies_only_ancestors() -> Result<()> {
    let store = MockStore::new();
    let definitions = vec![
        definition(1, &[]),
        definition(2, &[1]),
        definition(3, &[1]),
        definition(4, &[2, 3]),
    ];
    let runner = runner(vec![(schema("frontend", definitions), store.clone())]);

    let options = Options {
        operations: vec![MigrationOperation::targeted_up("frontend", vec![2])],
        ..Default::default()
    };
    runner.run(&CancellationToken::new(), options).await?;

    assert_eq!(store.state().up_calls, vec![1, 2]);
    assert_eq!(store.applied(), vec![1, 2]);
    Ok(())
}

#[tokio::test]
async fn test_failed_migration_rolls_back_and_marks_schema_dirty() -> Result<()> {
    let store = MockStore::new().with_up_error(2, "42601", "syntax error at or near \"TABL\"");
    let runner = runner(vec![(schema("frontend", chain(&[1, 2, 3])), store.clone())]);
    let cancel = CancellationToken::new();

    let err = runner
        .run(&cancel, upgrade(&["frontend"]))
        .await
        .unwrap_err();
    let rendered = format!("{:#}", err);
    assert!(rendered.contains("failed to run migration for schema \"frontend\""));
    assert!(rendered.contains("syntax error"));
    assert!(find_runner_error(&err).is_none());

    {
        let state = store.state();
        assert_eq!(state.up_calls, vec![1, 2]);
        assert_eq!(state.rollbacks, 1);
        assert_eq!(state.unlock_calls, state.locks_acquired);
    }
    let failed = store.latest_log(2).unwrap();
    assert_eq!(failed.success, Some(false));
    assert!(failed.error_message.unwrap().contains("syntax error"));

    // The failed log entry blocks further runs.
    let err = runner
        .run(&cancel, upgrade(&["frontend"]))
        .await
        .unwrap_err();
    assert_eq!(
        find_runner_error(&err),
        Some(&RunnerError::DirtySchema {
            schema_name: "frontend".to_string(),
            definition_ids: vec![2],
        })
    );

    // Unless the operator retries the failed migration explicitly.
    let options = Options {
        ignore_single_dirty_log: true,
        ..upgrade(&["frontend"])
    };
    runner.run(&cancel, options).await?;
    assert_eq!(store.applied(), vec![1, 2, 3]);
    let state = store.state();
    assert_eq!(state.unlock_calls, state.locks_acquired);
    Ok(())
}

#[tokio::test]
async fn test_interrupted_migration_requires_opt_in() -> Result<()> {
    let store = MockStore::new()
        .with_applied(&[1])
        .with_log(2, true, None);
    let runner = runner(vec![(schema("frontend", chain(&[1, 2, 3])), store.clone())]);
    let cancel = CancellationToken::new();

    let err = runner
        .run(&cancel, upgrade(&["frontend"]))
        .await
        .unwrap_err();
    assert!(matches!(
        find_runner_error(&err),
        Some(RunnerError::DirtySchema { definition_ids, .. }) if definition_ids == &vec![2]
    ));
    assert!(store.state().up_calls.is_empty());

    let options = Options {
        ignore_single_pending_log: true,
        ..upgrade(&["frontend"])
    };
    runner.run(&cancel, options).await?;
    assert_eq!(store.state().up_calls, vec![2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_waits_for_lock_held_elsewhere() -> Result<()> {
    let store = MockStore::new().with_denied_locks(7);
    let runner = runner(vec![(schema("frontend", chain(&[1, 2])), store.clone())]);

    runner
        .run(&CancellationToken::new(), upgrade(&["frontend"]))
        .await?;

    let state = store.state();
    assert_eq!(state.try_lock_calls, 8);
    assert_eq!(state.locks_acquired, 1);
    assert_eq!(state.unlock_calls, 1);
    assert_eq!(state.up_calls, vec![1, 2]);
    Ok(())
}

#[tokio::test]
async fn test_cancellation_while_waiting_for_lock() {
    let store = MockStore::new().with_denied_locks(usize::MAX);
    let runner = runner(vec![(schema("frontend", chain(&[1, 2])), store.clone())]);
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = runner
        .run(&cancel, upgrade(&["frontend"]))
        .await
        .unwrap_err();
    assert_eq!(find_runner_error(&err), Some(&RunnerError::Cancelled));

    let state = store.state();
    assert!(state.try_lock_calls > 0);
    assert_eq!(state.locks_acquired, 0);
    assert!(state.up_calls.is_empty());
}

#[tokio::test]
async fn test_failures_are_isolated_per_schema() -> Result<()> {
    let frontend = MockStore::new();
    let codeintel = MockStore::new().with_up_error(11, "42P01", "relation \"uploads\" does not exist");
    let insights = MockStore::new().with_up_error(20, "42P01", "relation \"series\" does not exist");
    let runner = runner(vec![
        (schema("frontend", chain(&[1, 2])), frontend.clone()),
        (schema("codeintel", chain(&[10, 11])), codeintel.clone()),
        (schema("insights", chain(&[20])), insights.clone()),
    ]);

    let options = Options {
        parallel: true,
        ..upgrade(&["insights", "frontend", "codeintel"])
    };
    let err = runner
        .run(&CancellationToken::new(), options)
        .await
        .unwrap_err();

    let multi = err.downcast_ref::<MultiError>().unwrap();
    assert_eq!(multi.errors().len(), 2);
    assert!(format!("{:#}", multi.errors()[0]).contains("\"codeintel\""));
    assert!(format!("{:#}", multi.errors()[1]).contains("\"insights\""));
    assert!(err.to_string().starts_with("2 errors occurred:"));

    assert_eq!(frontend.applied(), vec![1, 2]);
    assert_eq!(codeintel.applied(), vec![10]);
    assert!(insights.applied().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_invalid_options_are_rejected_before_any_io() {
    let store = MockStore::new();
    let runner = runner(vec![(schema("frontend", chain(&[1])), store.clone())]);
    let cancel = CancellationToken::new();

    let options = Options {
        operations: vec![
            MigrationOperation::upgrade("frontend"),
            MigrationOperation::targeted_up("frontend", vec![1]),
        ],
        ..Default::default()
    };
    let err = runner.run(&cancel, options).await.unwrap_err();
    assert_eq!(
        find_runner_error(&err),
        Some(&RunnerError::DuplicateOperations {
            schema_name: "frontend".to_string()
        })
    );

    let err = runner
        .run(&cancel, upgrade(&["billing"]))
        .await
        .unwrap_err();
    assert_eq!(
        find_runner_error(&err),
        Some(&RunnerError::UnknownSchema {
            schema_name: "billing".to_string()
        })
    );

    let options = Options {
        operations: vec![MigrationOperation::targeted_up("frontend", vec![99])],
        ..Default::default()
    };
    let err = runner.run(&cancel, options).await.unwrap_err();
    assert!(matches!(
        find_runner_error(&err),
        Some(RunnerError::UnknownDefinition { id: 99, .. })
    ));

    assert_eq!(store.state().try_lock_calls, 0);
}
