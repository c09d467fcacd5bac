use anyhow::{Context, Result};
use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Runs the `schemaflow` binary inside a throwaway project directory.
pub struct CliTestHelper {
    pub temp_dir: TempDir,
    pub project_root: PathBuf,
}

impl CliTestHelper {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let project_root = temp_dir.path().to_path_buf();

        Self {
            temp_dir,
            project_root,
        }
    }

    /// A command rooted at the project directory with no ambient database URL.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("schemaflow").expect("Failed to find schemaflow binary");
        cmd.current_dir(&self.project_root)
            .env_remove("DATABASE_URL")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn write_file(&self, relative_path: &str, contents: &str) -> Result<PathBuf> {
        let path = self.project_root.join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn write_json(&self, relative_path: &str, value: &serde_json::Value) -> Result<PathBuf> {
        self.write_file(relative_path, &serde_json::to_string_pretty(value)?)
    }

    pub fn path(&self, relative_path: &str) -> PathBuf {
        self.project_root.join(relative_path)
    }

    pub fn root(&self) -> &Path {
        &self.project_root
    }
}

impl Default for CliTestHelper {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a CLI test in a fresh project directory that is removed afterwards.
pub async fn with_cli_helper<F, R>(test_fn: F) -> R
where
    F: std::ops::AsyncFnOnce(&CliTestHelper) -> R,
{
    let helper = CliTestHelper::new();
    test_fn(&helper).await
}
