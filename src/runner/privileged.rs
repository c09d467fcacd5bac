use super::desugar::Direction;
use super::errors::RunnerError;
use super::{Options, PrivilegedMode};
use crate::definition::Definition;
use itertools::Itertools;
use sha1::{Digest, Sha1};
use std::sync::Arc;

/// Predicate deciding whether an operator-supplied hash authorizes skipping
/// a set of privileged migrations.
pub type PrivilegedHashMatcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Matcher accepting exactly `expected`.
pub fn privileged_hash_matcher(expected: impl Into<String>) -> PrivilegedHashMatcher {
    let expected = expected.into();
    Arc::new(move |hash: &str| hash == expected)
}

/// Stable hash of a set of privileged migration IDs, independent of order.
pub fn privileged_hash(ids: &[i64]) -> String {
    let joined = ids.iter().sorted().join(",");
    format!("{:x}", Sha1::digest(joined.as_bytes()))
}

/// Gate privileged migrations before anything is applied. Only upward
/// migrations are gated.
pub(crate) fn check_privileged_state(
    schema_name: &str,
    direction: Direction,
    definitions: &[Definition],
    options: &Options,
) -> Result<(), RunnerError> {
    if !direction.is_up() {
        return Ok(());
    }

    let ids: Vec<i64> = definitions
        .iter()
        .filter(|d| d.privileged)
        .map(|d| d.id)
        .collect();
    if ids.is_empty() {
        return Ok(());
    }

    let hash = privileged_hash(&ids);
    match options.privileged_mode {
        PrivilegedMode::Apply => Ok(()),
        PrivilegedMode::Refuse => Err(RunnerError::PrivilegedMigration {
            schema_name: schema_name.to_string(),
            definition_ids: ids,
            hash,
        }),
        PrivilegedMode::Noop => {
            let matches = options
                .matches_privileged_hash
                .as_ref()
                .is_some_and(|matcher| matcher(&hash));
            if matches {
                Ok(())
            } else {
                Err(RunnerError::PrivilegedHashMismatch {
                    schema_name: schema_name.to_string(),
                    definition_ids: ids,
                    hash,
                })
            }
        }
    }
}
