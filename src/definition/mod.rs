//! Migration definitions and the DAG they form.

pub mod loader;

pub use loader::{load_definitions, parse_definition_dirname};

use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Table and index created by a `CREATE INDEX CONCURRENTLY` migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetadata {
    pub table_name: String,
    pub index_name: String,
}

/// One immutable migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub id: i64,
    pub name: String,
    pub up_query: String,
    pub down_query: String,
    pub privileged: bool,
    pub parents: Vec<i64>,
    pub is_create_index_concurrently: bool,
    pub index_metadata: Option<IndexMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("no migration definitions found")]
    Empty,
    #[error("duplicate migration definition {0}")]
    DuplicateId(i64),
    #[error("migration {id} references unknown parent {parent}")]
    UnknownParent { id: i64, parent: i64 },
    #[error("migration graph contains a cycle through {0}")]
    Cycle(i64),
    #[error("expected exactly one root migration, found {0:?}")]
    Roots(Vec<i64>),
    #[error("unknown migration {0}")]
    UnknownDefinition(i64),
}

/// All definitions of one schema, stored in topological order with ties
/// broken by ID.
#[derive(Debug, Clone)]
pub struct Definitions {
    definitions: Vec<Definition>,
    positions: HashMap<i64, usize>,
    children: HashMap<i64, Vec<i64>>,
}

impl Definitions {
    pub fn new(definitions: Vec<Definition>) -> Result<Self, DefinitionError> {
        if definitions.is_empty() {
            return Err(DefinitionError::Empty);
        }

        let mut by_id: HashMap<i64, Definition> = HashMap::new();
        for definition in definitions {
            let id = definition.id;
            if by_id.insert(id, definition).is_some() {
                return Err(DefinitionError::DuplicateId(id));
            }
        }

        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        for definition in by_id.values() {
            for parent in &definition.parents {
                if !by_id.contains_key(parent) {
                    return Err(DefinitionError::UnknownParent {
                        id: definition.id,
                        parent: *parent,
                    });
                }
                children.entry(*parent).or_default().push(definition.id);
            }
        }
        for ids in children.values_mut() {
            ids.sort_unstable();
            ids.dedup();
        }

        let mut roots: Vec<i64> = by_id
            .values()
            .filter(|d| d.parents.is_empty())
            .map(|d| d.id)
            .collect();
        roots.sort_unstable();
        if roots.len() != 1 {
            // A cycle can leave the graph without any root at all.
            if roots.is_empty() {
                let mut ids: Vec<i64> = by_id.keys().copied().collect();
                ids.sort_unstable();
                return Err(DefinitionError::Cycle(ids[0]));
            }
            return Err(DefinitionError::Roots(roots));
        }

        let order = topological_order(&by_id, &children)?;
        let definitions: Vec<Definition> = order
            .into_iter()
            .filter_map(|id| by_id.remove(&id))
            .collect();
        let positions = definitions
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id, i))
            .collect();

        Ok(Self {
            definitions,
            positions,
            children,
        })
    }

    pub fn all(&self) -> &[Definition] {
        &self.definitions
    }

    pub fn get_by_id(&self, id: i64) -> Option<&Definition> {
        self.positions.get(&id).map(|&i| &self.definitions[i])
    }

    pub fn root(&self) -> &Definition {
        &self.definitions[0]
    }

    /// Definitions without children, in topological order.
    pub fn leaves(&self) -> Vec<&Definition> {
        self.definitions
            .iter()
            .filter(|d| !self.children.contains_key(&d.id))
            .collect()
    }

    pub fn leaf_ids(&self) -> Vec<i64> {
        self.leaves().into_iter().map(|d| d.id).collect()
    }

    /// The named definitions, in topological order.
    pub fn filter(&self, ids: &[i64]) -> Result<Vec<Definition>, DefinitionError> {
        let wanted = self.known(ids)?;
        Ok(self
            .definitions
            .iter()
            .filter(|d| wanted.contains(&d.id))
            .cloned()
            .collect())
    }

    /// Definitions to apply so every target and all of its ancestors are
    /// applied, in topological order.
    pub fn up(&self, applied: &[i64], targets: &[i64]) -> Result<Vec<Definition>, DefinitionError> {
        let mut needed = self.known(targets)?;
        let mut frontier: Vec<i64> = needed.iter().copied().collect();
        while let Some(id) = frontier.pop() {
            if let Some(definition) = self.get_by_id(id) {
                for parent in &definition.parents {
                    if needed.insert(*parent) {
                        frontier.push(*parent);
                    }
                }
            }
        }

        let applied: HashSet<i64> = applied.iter().copied().collect();
        Ok(self
            .definitions
            .iter()
            .filter(|d| needed.contains(&d.id) && !applied.contains(&d.id))
            .cloned()
            .collect())
    }

    /// Applied definitions to unapply so that no descendant of the targets
    /// remains, in reverse topological order. The targets themselves stay
    /// applied. With no targets every applied definition is returned.
    pub fn down(
        &self,
        applied: &[i64],
        targets: &[i64],
    ) -> Result<Vec<Definition>, DefinitionError> {
        let applied: HashSet<i64> = applied.iter().copied().collect();

        let remove: HashSet<i64> = if targets.is_empty() {
            applied.clone()
        } else {
            let targets = self.known(targets)?;
            let mut descendants = HashSet::new();
            let mut frontier: Vec<i64> = targets.iter().copied().collect();
            while let Some(id) = frontier.pop() {
                for child in self.children.get(&id).into_iter().flatten() {
                    if descendants.insert(*child) {
                        frontier.push(*child);
                    }
                }
            }
            descendants.retain(|id| !targets.contains(id));
            descendants
        };

        Ok(self
            .definitions
            .iter()
            .rev()
            .filter(|d| remove.contains(&d.id) && applied.contains(&d.id))
            .cloned()
            .collect())
    }

    fn known(&self, ids: &[i64]) -> Result<HashSet<i64>, DefinitionError> {
        ids.iter()
            .map(|&id| {
                if self.positions.contains_key(&id) {
                    Ok(id)
                } else {
                    Err(DefinitionError::UnknownDefinition(id))
                }
            })
            .collect()
    }
}

/// Kahn's algorithm once `petgraph` has ruled out cycles; ready nodes are
/// taken smallest ID first.
fn topological_order(
    by_id: &HashMap<i64, Definition>,
    children: &HashMap<i64, Vec<i64>>,
) -> Result<Vec<i64>, DefinitionError> {
    use petgraph::algo::toposort;
    use petgraph::graphmap::DiGraphMap;

    let mut graph: DiGraphMap<i64, ()> = DiGraphMap::new();
    for id in by_id.keys() {
        graph.add_node(*id);
    }
    for (parent, ids) in children {
        for child in ids {
            graph.add_edge(*parent, *child, ());
        }
    }
    toposort(&graph, None).map_err(|cycle| DefinitionError::Cycle(cycle.node_id()))?;

    let mut remaining: HashMap<i64, usize> = by_id
        .values()
        .map(|d| (d.id, d.parents.iter().collect::<HashSet<_>>().len()))
        .collect();
    let mut ready: BTreeSet<i64> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut order = Vec::with_capacity(by_id.len());
    while let Some(id) = ready.pop_first() {
        order.push(id);
        for child in children.get(&id).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(child) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*child);
                }
            }
        }
    }

    Ok(order)
}
