use crate::config::types::*;

/// Trait for merging optional configuration values
pub trait Merge<T> {
    fn merge(self, other: T) -> T;
}

impl<T> Merge<Option<T>> for Option<T> {
    fn merge(self, other: Option<T>) -> Option<T> {
        other.or(self)
    }
}

impl Merge<ConfigInput> for ConfigInput {
    fn merge(self, other: ConfigInput) -> ConfigInput {
        ConfigInput {
            database_url: self.database_url.merge(other.database_url),
            migrations_dir: self.migrations_dir.merge(other.migrations_dir),
            // The schema list is replaced as a whole
            schemas: self.schemas.merge(other.schemas),
            runner: match (self.runner, other.runner) {
                (None, None) => None,
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (Some(a), Some(b)) => Some(a.merge_with(b)),
            },
        }
    }
}

impl RunnerInput {
    pub fn merge_with(self, other: RunnerInput) -> RunnerInput {
        RunnerInput {
            parallel: other.parallel.or(self.parallel),
            privileged_mode: other.privileged_mode.or(self.privileged_mode),
            privileged_hash: other.privileged_hash.or(self.privileged_hash),
            ignore_single_dirty_log: other
                .ignore_single_dirty_log
                .or(self.ignore_single_dirty_log),
            ignore_single_pending_log: other
                .ignore_single_pending_log
                .or(self.ignore_single_pending_log),
            lock_poll_interval_ms: other.lock_poll_interval_ms.or(self.lock_poll_interval_ms),
            index_poll_interval_ms: other.index_poll_interval_ms.or(self.index_poll_interval_ms),
        }
    }
}
