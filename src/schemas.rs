use crate::definition::{Definitions, load_definitions};
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// A migratable database schema and its migration graph.
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    pub migrations_table_name: String,
    pub definitions: Definitions,
}

impl Schema {
    pub fn new(
        name: impl Into<String>,
        migrations_table_name: impl Into<String>,
        definitions: Definitions,
    ) -> Self {
        Self {
            name: name.into(),
            migrations_table_name: migrations_table_name.into(),
            definitions,
        }
    }

    /// Load definitions from `<migrations_dir>/<name>/`.
    pub fn load(name: &str, migrations_table_name: &str, migrations_dir: &Path) -> Result<Self> {
        let definitions = load_definitions(&migrations_dir.join(name))
            .with_context(|| format!("Failed to load definitions for schema {:?}", name))?;
        Ok(Self::new(name, migrations_table_name, definitions))
    }
}

/// The set of schemas a runner is allowed to operate on.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn new(schemas: impl IntoIterator<Item = Schema>) -> Result<Self> {
        let mut registry = Self::default();
        for schema in schemas {
            if registry.schemas.contains_key(&schema.name) {
                bail!("schema {:?} is registered twice", schema.name);
            }
            registry.schemas.insert(schema.name.clone(), Arc::new(schema));
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
