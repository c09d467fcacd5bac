use crate::definition::Definition;
use crate::store::SchemaVersion;
use std::collections::HashSet;

/// Definitions partitioned by their state in one version snapshot.
/// Definitions absent from the snapshot belong to none of the sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefinitionsByState {
    pub applied: Vec<Definition>,
    pub pending: Vec<Definition>,
    pub failed: Vec<Definition>,
}

pub fn group_by_state(version: &SchemaVersion, definitions: &[Definition]) -> DefinitionsByState {
    let applied: HashSet<i64> = version.applied_versions.iter().copied().collect();
    let pending: HashSet<i64> = version.pending_versions.iter().copied().collect();
    let failed: HashSet<i64> = version.failed_versions.iter().copied().collect();

    let mut by_state = DefinitionsByState::default();
    for definition in definitions {
        if applied.contains(&definition.id) {
            by_state.applied.push(definition.clone());
        }
        if pending.contains(&definition.id) {
            by_state.pending.push(definition.clone());
        }
        if failed.contains(&definition.id) {
            by_state.failed.push(definition.clone());
        }
    }

    by_state
}

pub(crate) fn ids(definitions: &[Definition]) -> Vec<i64> {
    definitions.iter().map(|d| d.id).collect()
}
