//! Canonicalization and comparison-time normalization of schema descriptions.
//!
//! [`Normalize`] only produces copies used for equality checks; repair SQL is
//! always built from the original definitions.

use super::{
    ColumnDescription, ConstraintDescription, EnumDescription, FunctionDescription,
    IndexDescription, Named, SchemaDescription, SequenceDescription, TableDescription,
    TriggerDescription, ViewDescription,
};
use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Sort every named collection so pairing by name is independent of
/// introspection order. Columns keep declaration order; everything else is
/// ordered by name.
pub fn canonicalize(mut description: SchemaDescription) -> SchemaDescription {
    description.extensions.sort();
    sort_by_name(&mut description.enums);
    sort_by_name(&mut description.functions);
    sort_by_name(&mut description.sequences);
    sort_by_name(&mut description.views);
    sort_by_name(&mut description.tables);

    for table in &mut description.tables {
        table
            .columns
            .sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.name.cmp(&b.name)));
        sort_by_name(&mut table.indexes);
        sort_by_name(&mut table.constraints);
        sort_by_name(&mut table.triggers);
    }

    description
}

fn sort_by_name<T: Named>(items: &mut [T]) {
    items.sort_by(|a, b| a.name().cmp(b.name()));
}

fn normalize_function_body(definition: &str) -> String {
    let stripped = definition
        .lines()
        .map(strip_line_comment)
        .collect::<Vec<_>>()
        .join("\n");

    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// Drop a trailing `--` comment, ignoring dashes inside string literals.
fn strip_line_comment(line: &str) -> &str {
    let mut in_string = false;
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => in_string = !in_string,
            b'-' if !in_string && bytes.get(i + 1) == Some(&b'-') => return &line[..i],
            _ => {}
        }
        i += 1;
    }

    line
}

/// Strip fields that are noise when comparing two entities of the same kind.
pub trait Normalize: Clone {
    fn normalize(&self) -> Self {
        self.clone()
    }
}

impl Normalize for String {}
impl Normalize for EnumDescription {}
impl Normalize for SequenceDescription {}
impl Normalize for IndexDescription {}
impl Normalize for ConstraintDescription {}
impl Normalize for TriggerDescription {}
impl Normalize for ViewDescription {}

/// Bodies differing only in whitespace or trailing line comments compare equal.
impl Normalize for FunctionDescription {
    fn normalize(&self) -> Self {
        FunctionDescription {
            definition: normalize_function_body(&self.definition),
            ..self.clone()
        }
    }
}

impl Normalize for ColumnDescription {
    fn normalize(&self) -> Self {
        ColumnDescription {
            index: -1,
            comment: String::new(),
            ..self.clone()
        }
    }
}

impl Normalize for TableDescription {
    fn normalize(&self) -> Self {
        TableDescription {
            comment: String::new(),
            columns: self.columns.iter().map(Normalize::normalize).collect(),
            ..self.clone()
        }
    }
}
