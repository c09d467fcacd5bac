use crate::helpers::mock_store::{
    MockStore, building_index, concurrent_index, definition, invalid_index, runner, schema,
    valid_index,
};
use anyhow::Result;
use schemaflow::definition::Definition;
use schemaflow::runner::{MigrationOperation, Options, RunnerError, find_runner_error};
use tokio_util::sync::CancellationToken;

const INDEX: &str = "users_email_idx";

fn definitions() -> Vec<Definition> {
    vec![
        definition(1, &[]),
        concurrent_index(2, &[1], INDEX),
        definition(3, &[2]),
    ]
}

fn upgrade() -> Options {
    Options {
        operations: vec![MigrationOperation::upgrade("frontend")],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_index_is_built_outside_the_lock_and_transaction() -> Result<()> {
    let store = MockStore::new();
    let runner = runner(vec![(schema("frontend", definitions()), store.clone())]);

    runner.run(&CancellationToken::new(), upgrade()).await?;

    let state = store.state();
    assert_eq!(state.up_calls, vec![1, 2, 3]);
    // Only the plain migrations run in a transaction.
    assert_eq!(state.transactions, 2);
    // The lock is given up for the build and taken again afterwards.
    assert_eq!(state.locks_acquired, 2);
    assert_eq!(state.unlock_calls, 2);
    drop(state);

    assert_eq!(store.applied(), vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_index_race_is_tolerated() -> Result<()> {
    // Another process creates the index between the status check and our
    // CREATE INDEX CONCURRENTLY.
    let store = MockStore::new()
        .with_index_statuses(INDEX, vec![None, valid_index()])
        .with_up_error(2, "42P07", "relation \"users_email_idx\" already exists");
    let runner = runner(vec![(schema("frontend", definitions()), store.clone())]);

    runner.run(&CancellationToken::new(), upgrade()).await?;

    assert_eq!(store.state().up_calls, vec![1, 2, 3]);
    assert_eq!(store.latest_log(2).unwrap().success, Some(true));
    assert_eq!(store.applied(), vec![1, 2, 3]);

    let state = store.state();
    assert_eq!(state.unlock_calls, state.locks_acquired);
    assert!(!state.locked);
    Ok(())
}

#[tokio::test]
async fn test_existing_valid_index_is_only_logged() -> Result<()> {
    let store = MockStore::new()
        .with_applied(&[1])
        .with_index_statuses(INDEX, vec![valid_index()]);
    let runner = runner(vec![(schema("frontend", definitions()), store.clone())]);

    runner.run(&CancellationToken::new(), upgrade()).await?;

    let state = store.state();
    assert_eq!(state.up_calls, vec![3]);
    // The lock was never given up.
    assert_eq!(state.locks_acquired, 1);
    assert_eq!(state.unlock_calls, 1);
    drop(state);

    assert_eq!(store.latest_log(2).unwrap().success, Some(true));
    assert_eq!(store.applied(), vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_invalid_index_is_dropped_and_rebuilt() -> Result<()> {
    let store = MockStore::new()
        .with_applied(&[1])
        .with_index_statuses(INDEX, vec![invalid_index(), None]);
    let runner = runner(vec![(schema("frontend", definitions()), store.clone())]);

    runner.run(&CancellationToken::new(), upgrade()).await?;

    let state = store.state();
    assert_eq!(state.down_calls, vec![2]);
    assert_eq!(state.up_calls, vec![2, 3]);
    drop(state);

    assert_eq!(store.applied(), vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_waits_for_index_built_by_another_process() -> Result<()> {
    let store = MockStore::new()
        .with_applied(&[1])
        .with_index_statuses(INDEX, vec![building_index(), building_index(), valid_index()]);
    let runner = runner(vec![(schema("frontend", definitions()), store.clone())]);

    runner.run(&CancellationToken::new(), upgrade()).await?;

    assert_eq!(store.state().up_calls, vec![3]);
    assert_eq!(store.applied(), vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn test_unfinished_index_migration_without_a_build_is_dirty() {
    let store = MockStore::new().with_applied(&[1]).with_log(2, true, None);
    let runner = runner(vec![(schema("frontend", definitions()), store.clone())]);

    let err = runner
        .run(&CancellationToken::new(), upgrade())
        .await
        .unwrap_err();

    assert_eq!(
        find_runner_error(&err),
        Some(&RunnerError::DirtySchema {
            schema_name: "frontend".to_string(),
            definition_ids: vec![2],
        })
    );
    assert!(store.state().up_calls.is_empty());
}
