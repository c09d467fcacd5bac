use crate::helpers::mock_store::{MockStore, definition, privileged, runner, schema};
use anyhow::Result;
use schemaflow::runner::{
    MigrationOperation, Options, PrivilegedMode, RunnerError, find_runner_error, privileged_hash,
    privileged_hash_matcher,
};
use tokio_util::sync::CancellationToken;

fn definitions() -> Vec<schemaflow::definition::Definition> {
    vec![
        definition(10001, &[]),
        definition(10002, &[10001]),
        definition(10003, &[10002]),
        definition(10004, &[10003]),
        privileged(10005, &[10004]),
    ]
}

fn options(mode: PrivilegedMode, hash: Option<String>) -> Options {
    Options {
        operations: vec![MigrationOperation::upgrade("frontend")],
        privileged_mode: mode,
        matches_privileged_hash: hash.map(privileged_hash_matcher),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_refuse_privileged_fails_before_applying_anything() {
    let store = MockStore::new();
    let runner = runner(vec![(schema("frontend", definitions()), store.clone())]);

    let err = runner
        .run(
            &CancellationToken::new(),
            options(PrivilegedMode::Refuse, None),
        )
        .await
        .unwrap_err();

    assert_eq!(
        find_runner_error(&err),
        Some(&RunnerError::PrivilegedMigration {
            schema_name: "frontend".to_string(),
            definition_ids: vec![10005],
            hash: privileged_hash(&[10005]),
        })
    );
    assert!(format!("{:#}", err).contains("10005"));

    let state = store.state();
    assert!(state.up_calls.is_empty());
    assert!(state.logs.is_empty());
    assert_eq!(state.unlock_calls, state.locks_acquired);
}

#[tokio::test]
async fn test_noop_privileged_records_without_running() -> Result<()> {
    let store = MockStore::new();
    let runner = runner(vec![(schema("frontend", definitions()), store.clone())]);
    let hash = privileged_hash(&[10005]);

    runner
        .run(
            &CancellationToken::new(),
            options(PrivilegedMode::Noop, Some(hash)),
        )
        .await?;

    assert_eq!(
        store.state().up_calls,
        vec![10001, 10002, 10003, 10004]
    );
    assert_eq!(store.latest_log(10005).unwrap().success, Some(true));
    assert_eq!(
        store.applied(),
        vec![10001, 10002, 10003, 10004, 10005]
    );
    Ok(())
}

#[tokio::test]
async fn test_noop_privileged_requires_matching_hash() {
    let store = MockStore::new();
    let runner = runner(vec![(schema("frontend", definitions()), store.clone())]);

    let err = runner
        .run(
            &CancellationToken::new(),
            options(PrivilegedMode::Noop, Some("0000".to_string())),
        )
        .await
        .unwrap_err();

    let Some(RunnerError::PrivilegedHashMismatch {
        definition_ids,
        hash,
        ..
    }) = find_runner_error(&err)
    else {
        panic!("unexpected error: {:#}", err);
    };
    assert_eq!(definition_ids, &vec![10005]);
    assert_eq!(hash, &privileged_hash(&[10005]));
    assert!(store.state().up_calls.is_empty());
}

#[tokio::test]
async fn test_noop_privileged_without_hash_is_a_configuration_error() {
    let store = MockStore::new();
    let runner = runner(vec![(schema("frontend", definitions()), store.clone())]);

    let err = runner
        .run(&CancellationToken::new(), options(PrivilegedMode::Noop, None))
        .await
        .unwrap_err();

    assert_eq!(
        find_runner_error(&err),
        Some(&RunnerError::MissingPrivilegedHashMatcher)
    );
    assert_eq!(store.state().try_lock_calls, 0);
}

#[tokio::test]
async fn test_privileged_down_migrations_are_not_gated() -> Result<()> {
    let store = MockStore::new().with_applied(&[10001, 10002, 10003, 10004, 10005]);
    let runner = runner(vec![(schema("frontend", definitions()), store.clone())]);

    let options = Options {
        operations: vec![MigrationOperation::targeted_down("frontend", vec![10004])],
        privileged_mode: PrivilegedMode::Refuse,
        ..Default::default()
    };
    runner.run(&CancellationToken::new(), options).await?;

    assert_eq!(store.state().down_calls, vec![10005]);
    assert_eq!(store.applied(), vec![10001, 10002, 10003, 10004]);
    Ok(())
}
