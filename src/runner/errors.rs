use itertools::Itertools;
use std::fmt;
use thiserror::Error;

fn join_ids(ids: &[i64]) -> String {
    ids.iter().join(", ")
}

/// Failures the runner classifies itself. Infrastructure errors from a store
/// are propagated as plain [`anyhow::Error`]s instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    #[error("schema {schema_name:?} is out of date: missing migrations {}", join_ids(.missing_ids))]
    SchemaOutOfDate {
        schema_name: String,
        missing_ids: Vec<i64>,
    },

    #[error("schema {schema_name:?} is dirty: migrations {} failed or never finished", join_ids(.definition_ids))]
    DirtySchema {
        schema_name: String,
        definition_ids: Vec<i64>,
    },

    #[error("refusing to apply privileged migrations {} to schema {schema_name:?}", join_ids(.definition_ids))]
    PrivilegedMigration {
        schema_name: String,
        definition_ids: Vec<i64>,
        hash: String,
    },

    #[error("privileged hash does not match migrations {} of schema {schema_name:?}", join_ids(.definition_ids))]
    PrivilegedHashMismatch {
        schema_name: String,
        definition_ids: Vec<i64>,
        hash: String,
    },

    #[error("multiple operations requested for schema {schema_name:?}")]
    DuplicateOperations { schema_name: String },

    #[error("skipping privileged migrations requires a privileged hash")]
    MissingPrivilegedHashMatcher,

    #[error("invalid privileged mode {0:?}: expected apply, refuse, or noop")]
    InvalidPrivilegedMode(String),

    #[error("unknown schema {schema_name:?}")]
    UnknownSchema { schema_name: String },

    #[error("unknown migration {id} for schema {schema_name:?}")]
    UnknownDefinition { schema_name: String, id: i64 },

    #[error("schema {schema_name:?} has no applied migrations to revert")]
    NothingToRevert { schema_name: String },

    #[error("ambiguous revert for schema {schema_name:?}: migrations {} are all leaves", join_ids(.leaf_ids))]
    AmbiguousRevert {
        schema_name: String,
        leaf_ids: Vec<i64>,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl RunnerError {
    /// Remediation for the operator.
    pub fn instructions(&self) -> String {
        match self {
            RunnerError::SchemaOutOfDate {
                schema_name,
                missing_ids,
            } => format!(
                "Apply the missing migrations ({}) with `schemaflow up --schema {}` before continuing.",
                join_ids(missing_ids),
                schema_name
            ),
            RunnerError::DirtySchema {
                schema_name,
                definition_ids,
            } => format!(
                "The migration log of schema {:?} records migrations {} as failed or unfinished, so the \
                 schema may be partially migrated. Inspect the error message of their latest log entries \
                 and repair the schema by hand. If the only failed migration is the next one to apply, \
                 re-run with --ignore-single-dirty-log; if a single migration was interrupted, re-run with \
                 --ignore-single-pending-log.",
                schema_name,
                join_ids(definition_ids)
            ),
            RunnerError::PrivilegedMigration {
                schema_name,
                definition_ids,
                hash,
            } => format!(
                "Migrations {} of schema {:?} need elevated database privileges. Apply their up SQL \
                 manually as a privileged user, then re-run with --privileged-mode noop \
                 --privileged-hash {} to record them without executing them.",
                join_ids(definition_ids),
                schema_name,
                hash
            ),
            RunnerError::PrivilegedHashMismatch {
                definition_ids,
                hash,
                ..
            } => format!(
                "Confirm that migrations {} were applied manually, then re-run with --privileged-hash {}.",
                join_ids(definition_ids),
                hash
            ),
            RunnerError::DuplicateOperations { .. } => {
                "Request at most one operation per schema.".to_string()
            }
            RunnerError::MissingPrivilegedHashMatcher => {
                "Pass --privileged-hash together with --privileged-mode noop.".to_string()
            }
            RunnerError::InvalidPrivilegedMode(_) => {
                "Use one of: apply, refuse, noop.".to_string()
            }
            RunnerError::UnknownSchema { .. } => {
                "Check the schema names in the configuration file.".to_string()
            }
            RunnerError::UnknownDefinition { schema_name, .. } => format!(
                "Check the migration IDs available under the {} migrations directory.",
                schema_name
            ),
            RunnerError::NothingToRevert { .. } => "There is nothing to undo.".to_string(),
            RunnerError::AmbiguousRevert {
                schema_name,
                leaf_ids,
            } => format!(
                "Migrations {} can each be reverted. Use `schemaflow down --schema {} --target <ids>` \
                 to choose explicitly.",
                join_ids(leaf_ids),
                schema_name
            ),
            RunnerError::Cancelled => "Re-run the command to resume.".to_string(),
        }
    }
}

/// Failures of several schemas in one run or validation.
#[derive(Debug)]
pub struct MultiError {
    errors: Vec<anyhow::Error>,
}

impl MultiError {
    /// A single error is returned as-is; several are wrapped.
    pub fn aggregate(mut errors: Vec<anyhow::Error>) -> Option<anyhow::Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(anyhow::Error::new(MultiError { errors })),
        }
    }

    pub fn errors(&self) -> &[anyhow::Error] {
        &self.errors
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n\t* {:#}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

/// Find the first [`RunnerError`] in an error, looking inside a
/// [`MultiError`] when necessary.
pub fn find_runner_error(error: &anyhow::Error) -> Option<&RunnerError> {
    if let Some(runner_error) = error.downcast_ref::<RunnerError>() {
        return Some(runner_error);
    }

    error
        .downcast_ref::<MultiError>()
        .and_then(|multi| multi.errors().iter().find_map(find_runner_error))
}
