use crate::helpers::mock_store::{MockStore, chain, definition, runner, schema};
use anyhow::Result;
use schemaflow::runner::{MigrationOperation, Options, RunnerError, find_runner_error};
use tokio_util::sync::CancellationToken;

fn revert() -> Options {
    Options {
        operations: vec![MigrationOperation::revert("frontend")],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_revert_undoes_the_tip_of_a_chain() -> Result<()> {
    let store = MockStore::new().with_applied(&[1, 2, 3]);
    let runner = runner(vec![(schema("frontend", chain(&[1, 2, 3])), store.clone())]);

    runner.run(&CancellationToken::new(), revert()).await?;

    assert_eq!(store.state().down_calls, vec![3]);
    let log = store.latest_log(3).unwrap();
    assert!(!log.up);
    assert_eq!(log.success, Some(true));
    assert_eq!(store.applied(), vec![1, 2]);
    Ok(())
}

#[tokio::test]
async fn test_revert_with_two_tips_is_ambiguous() {
    let store = MockStore::new().with_applied(&[1, 2, 3, 4]);
    let definitions = vec![
        definition(1, &[]),
        definition(2, &[1]),
        definition(3, &[2]),
        definition(4, &[1]),
    ];
    let runner = runner(vec![(schema("frontend", definitions), store.clone())]);

    let err = runner
        .run(&CancellationToken::new(), revert())
        .await
        .unwrap_err();

    let runner_error = find_runner_error(&err).unwrap();
    assert_eq!(
        runner_error,
        &RunnerError::AmbiguousRevert {
            schema_name: "frontend".to_string(),
            leaf_ids: vec![3, 4],
        }
    );
    assert!(runner_error.instructions().contains("schemaflow down"));
    assert_eq!(store.state().try_lock_calls, 0);
    assert!(store.state().down_calls.is_empty());
}

#[tokio::test]
async fn test_revert_with_nothing_applied() {
    let store = MockStore::new();
    let runner = runner(vec![(schema("frontend", chain(&[1, 2])), store.clone())]);

    let err = runner
        .run(&CancellationToken::new(), revert())
        .await
        .unwrap_err();
    assert!(matches!(
        find_runner_error(&err),
        Some(RunnerError::NothingToRevert { .. })
    ));
}

#[tokio::test]
async fn test_targeted_down_unapplies_descendants_newest_first() -> Result<()> {
    let store = MockStore::new().with_applied(&[1, 2, 3, 4]);
    let runner = runner(vec![(schema("frontend", chain(&[1, 2, 3, 4])), store.clone())]);

    let options = Options {
        operations: vec![MigrationOperation::targeted_down("frontend", vec![2])],
        ..Default::default()
    };
    runner.run(&CancellationToken::new(), options).await?;

    let state = store.state();
    assert_eq!(state.down_calls, vec![4, 3]);
    assert_eq!(state.commits, 2);
    drop(state);
    assert_eq!(store.applied(), vec![1, 2]);
    Ok(())
}
