use super::{Definition, Definitions, IndexMetadata};
use crate::constants::{DOWN_FILENAME, METADATA_FILENAME, UP_FILENAME};
use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

static CREATE_INDEX_CONCURRENTLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)CREATE\s+(?:UNIQUE\s+)?INDEX\s+CONCURRENTLY\s+(?:IF\s+NOT\s+EXISTS\s+)?("?[\w.]+"?)\s+ON\s+(?:ONLY\s+)?("?[\w.]+"?)"#,
    )
    .unwrap()
});

static TRANSACTION_CONTROL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*(BEGIN|COMMIT)\s*;").unwrap());

/// Contents of `metadata.yaml` inside a definition directory
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionMetadata {
    name: Option<String>,
    #[serde(default)]
    parents: Vec<i64>,
    #[serde(default)]
    privileged: bool,
    #[serde(default)]
    create_index_concurrently: bool,
}

/// Parse a definition directory name like "1528395684_add_users_table".
pub fn parse_definition_dirname(dirname: &str) -> Option<(i64, String)> {
    let (id, slug) = dirname.split_once('_').unwrap_or((dirname, ""));
    let id = id.parse::<i64>().ok()?;
    Some((id, slug.replace('_', " ")))
}

/// Load every definition under `dir`, one subdirectory per migration.
pub fn load_definitions(dir: &Path) -> Result<Definitions> {
    let mut definitions = Vec::new();

    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read migrations directory {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }

        let Some((id, slug)) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_definition_dirname)
        else {
            debug!("Skipping {}: not a migration directory", path.display());
            continue;
        };

        let definition = load_definition(&path, id, slug)
            .with_context(|| format!("Failed to load migration {}", id))?;
        definitions.push(definition);
    }

    Definitions::new(definitions)
        .with_context(|| format!("Invalid migration graph in {}", dir.display()))
}

fn load_definition(path: &Path, id: i64, slug: String) -> Result<Definition> {
    let up_query = read_file(&path.join(UP_FILENAME))?;
    let down_query = read_file(&path.join(DOWN_FILENAME))?;

    let metadata_path = path.join(METADATA_FILENAME);
    let metadata: DefinitionMetadata = if metadata_path.exists() {
        let contents = read_file(&metadata_path)?;
        if contents.trim().is_empty() {
            DefinitionMetadata::default()
        } else {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", metadata_path.display()))?
        }
    } else {
        DefinitionMetadata::default()
    };

    let index_metadata = if metadata.create_index_concurrently {
        Some(extract_index_metadata(&up_query)?)
    } else {
        None
    };

    Ok(Definition {
        id,
        name: metadata.name.unwrap_or(slug),
        up_query,
        down_query,
        privileged: metadata.privileged,
        parents: metadata.parents,
        is_create_index_concurrently: metadata.create_index_concurrently,
        index_metadata,
    })
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Find the single `CREATE INDEX CONCURRENTLY` statement of an up query.
///
/// The statement cannot run inside a transaction block, so explicit
/// transaction control is rejected as well.
pub fn extract_index_metadata(up_query: &str) -> Result<IndexMetadata> {
    if TRANSACTION_CONTROL.is_match(up_query) {
        bail!("CREATE INDEX CONCURRENTLY cannot be used within a transaction block");
    }

    let mut matches = CREATE_INDEX_CONCURRENTLY.captures_iter(up_query);
    let captures = matches
        .next()
        .ok_or_else(|| anyhow!("CREATE INDEX CONCURRENTLY migration has no index statement"))?;
    if matches.next().is_some() {
        bail!("CREATE INDEX CONCURRENTLY migration must create exactly one index");
    }

    Ok(IndexMetadata {
        index_name: unquote(&captures[1]),
        table_name: unquote(&captures[2]),
    })
}

fn unquote(ident: &str) -> String {
    ident.trim_matches('"').to_string()
}
