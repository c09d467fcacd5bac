use super::named::compare_named_lists;
use super::{Summary, docs_url};
use crate::schema::{EnumDescription, SchemaDescription};
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

/// The additive repair of an enum could not be ordered: no remaining missing
/// label has a neighbor that already exists or will be created first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "cannot compute a valid enum alteration ordering for {enum_name:?}: labels {blocked:?} have no reachable neighbor"
)]
pub struct EnumOrderingError {
    pub enum_name: String,
    pub blocked: Vec<String>,
}

pub fn compare(actual: &SchemaDescription, expected: &SchemaDescription) -> Vec<Summary> {
    compare_named_lists(&actual.enums, &expected.enums, |enum_type, expected| {
        let name = expected.name.clone();

        let Some(enum_type) = enum_type else {
            return vec![
                Summary::new(
                    name.clone(),
                    format!("Missing enum {:?}", name),
                    "define the enum",
                )
                .with_statements([expected.create_statement()]),
            ];
        };

        let problem = match construct_enum_repair_statements(enum_type, expected) {
            Ok(Some(statements)) => {
                return vec![
                    Summary::new(
                        name.clone(),
                        format!(
                            "Missing {} {} for enum {:?}",
                            statements.len(),
                            if statements.len() == 1 { "label" } else { "labels" },
                            name
                        ),
                        "add the missing enum labels",
                    )
                    .with_diff(&expected.labels, &enum_type.labels)
                    .with_statements(statements),
                ];
            }
            Ok(None) => format!("Unexpected labels for enum {:?}", name),
            Err(err) => {
                warn!("{}", err);
                format!("Unexpected labels for enum {:?} ({})", name, err)
            }
        };

        vec![
            Summary::new(name, problem, "drop and re-define the enum")
                .with_diff(&expected.labels, &enum_type.labels)
                .with_statements([expected.drop_statement(), expected.create_statement()])
                .with_url_hint(docs_url("sql-altertype.html")),
        ]
    })
}

struct MissingLabel<'a> {
    label: &'a str,
    /// `(before, neighbor)`; `None` appends to an enum that has no labels yet.
    anchor: Option<(bool, &'a str)>,
}

/// `ALTER TYPE ... ADD VALUE` statements turning `actual` into `expected`.
///
/// Returns `Ok(None)` when labels can't be reached by adding values alone:
/// `actual` has labels missing from `expected`, or its labels are in a
/// different relative order. Labels can never be removed or moved in place.
pub fn construct_enum_repair_statements(
    actual: &EnumDescription,
    expected: &EnumDescription,
) -> Result<Option<Vec<String>>, EnumOrderingError> {
    let existing: HashSet<&str> = actual.labels.iter().map(String::as_str).collect();
    let wanted: HashSet<&str> = expected.labels.iter().map(String::as_str).collect();

    if !existing.is_subset(&wanted) {
        return Ok(None);
    }

    let retained: Vec<&str> = expected
        .labels
        .iter()
        .map(String::as_str)
        .filter(|label| existing.contains(label))
        .collect();
    let current: Vec<&str> = actual.labels.iter().map(String::as_str).collect();
    if retained != current {
        return Ok(None);
    }

    // Labels ahead of the first existing one are inserted BEFORE their successor, so
    // that chain ends at an existing label. All others go AFTER their predecessor.
    let mut missing: Vec<MissingLabel> = Vec::new();
    let mut passed_existing = false;
    for (i, label) in expected.labels.iter().enumerate() {
        if existing.contains(label.as_str()) {
            passed_existing = true;
            continue;
        }

        let anchor = if !passed_existing && !existing.is_empty() {
            expected.labels.get(i + 1).map(|next| (true, next.as_str()))
        } else if i > 0 {
            Some((false, expected.labels[i - 1].as_str()))
        } else {
            None
        };
        missing.push(MissingLabel { label, anchor });
    }

    if missing.is_empty() {
        return Ok(None);
    }

    let mut reachable = existing;
    let mut ordered = Vec::with_capacity(missing.len());

    while !missing.is_empty() {
        let Some(position) = missing.iter().position(|m| {
            m.anchor
                .is_none_or(|(_, neighbor)| reachable.contains(neighbor))
        }) else {
            return Err(EnumOrderingError {
                enum_name: expected.name.clone(),
                blocked: missing.iter().map(|m| m.label.to_string()).collect(),
            });
        };

        let next = missing.remove(position);
        reachable.insert(next.label);

        ordered.push(match next.anchor {
            Some((before, neighbor)) => expected.add_value_statement(next.label, before, neighbor),
            None => expected.append_value_statement(next.label),
        });
    }

    Ok(Some(ordered))
}
