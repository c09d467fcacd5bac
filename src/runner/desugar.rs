use super::errors::RunnerError;
use super::{MigrationOperation, MigrationOperationType};
use crate::definition::{Definition, DefinitionError};
use crate::schemas::Schema;
use crate::store::SchemaVersion;
use anyhow::Result;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Up,
    Down,
}

impl Direction {
    pub(crate) fn is_up(self) -> bool {
        self == Direction::Up
    }

    pub(crate) fn verb(self) -> &'static str {
        match self {
            Direction::Up => "apply",
            Direction::Down => "unapply",
        }
    }
}

/// An operation with an explicit direction and target set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TargetedOperation {
    pub direction: Direction,
    pub target_versions: Vec<i64>,
}

impl TargetedOperation {
    /// Definitions to apply or unapply, in execution order, starting from
    /// `applied`.
    pub(crate) fn definitions(&self, schema: &Schema, applied: &[i64]) -> Result<Vec<Definition>> {
        let result = match self.direction {
            Direction::Up => schema.definitions.up(applied, &self.target_versions),
            Direction::Down => schema.definitions.down(applied, &self.target_versions),
        };

        result.map_err(|err| match err {
            DefinitionError::UnknownDefinition(id) => RunnerError::UnknownDefinition {
                schema_name: schema.name.clone(),
                id,
            }
            .into(),
            other => anyhow::Error::new(other),
        })
    }
}

/// Rewrite upgrade and revert into targeted operations.
pub(crate) fn desugar_operation(
    schema: &Schema,
    version: &SchemaVersion,
    operation: &MigrationOperation,
) -> Result<TargetedOperation, RunnerError> {
    match operation.kind {
        MigrationOperationType::TargetedUp => Ok(TargetedOperation {
            direction: Direction::Up,
            target_versions: operation.target_versions.clone(),
        }),
        MigrationOperationType::TargetedDown => Ok(TargetedOperation {
            direction: Direction::Down,
            target_versions: operation.target_versions.clone(),
        }),
        MigrationOperationType::Upgrade => Ok(desugar_upgrade(schema)),
        MigrationOperationType::Revert => desugar_revert(schema, version),
    }
}

/// Target every leaf, which brings the whole graph up to date.
fn desugar_upgrade(schema: &Schema) -> TargetedOperation {
    TargetedOperation {
        direction: Direction::Up,
        target_versions: schema.definitions.leaf_ids(),
    }
}

/// Undo the single applied migration that no other applied migration
/// depends on, by migrating down to its parents.
fn desugar_revert(
    schema: &Schema,
    version: &SchemaVersion,
) -> Result<TargetedOperation, RunnerError> {
    let mut applied_children: HashMap<i64, usize> = version
        .applied_versions
        .iter()
        .filter(|id| schema.definitions.get_by_id(**id).is_some())
        .map(|id| (*id, 0))
        .collect();

    for definition in schema.definitions.all() {
        if !applied_children.contains_key(&definition.id) {
            continue;
        }
        for parent in &definition.parents {
            if let Some(count) = applied_children.get_mut(parent) {
                *count += 1;
            }
        }
    }

    let mut leaf_ids: Vec<i64> = applied_children
        .into_iter()
        .filter(|(_, count)| *count == 0)
        .map(|(id, _)| id)
        .collect();
    leaf_ids.sort_unstable();

    match leaf_ids.as_slice() {
        [] => Err(RunnerError::NothingToRevert {
            schema_name: schema.name.clone(),
        }),
        [leaf] => {
            let parents = schema
                .definitions
                .get_by_id(*leaf)
                .map(|d| d.parents.clone())
                .unwrap_or_default();
            Ok(TargetedOperation {
                direction: Direction::Down,
                target_versions: parents,
            })
        }
        _ => Err(RunnerError::AmbiguousRevert {
            schema_name: schema.name.clone(),
            leaf_ids,
        }),
    }
}
