//! Schema drift detection.
//!
//! Compares a live schema description against an expected snapshot and
//! explains every difference as a [`Summary`], most with the SQL that repairs
//! it. Nothing here executes SQL.

pub mod enums;
pub mod extensions;
pub mod functions;
pub mod named;
pub mod sequences;
pub mod summary;
pub mod tables;
pub mod views;

pub use enums::EnumOrderingError;
pub use summary::Summary;

use crate::constants::POSTGRES_DOCS_URL;
use crate::schema::{SchemaDescription, canonicalize};
use tracing::{debug, info};

type Comparator = fn(&SchemaDescription, &SchemaDescription) -> Vec<Summary>;

const COMPARATORS: [(&str, Comparator); 6] = [
    ("extensions", extensions::compare),
    ("enums", enums::compare),
    ("functions", functions::compare),
    ("sequences", sequences::compare),
    ("tables", tables::compare),
    ("views", views::compare),
];

/// Compare `actual` against `expected` and return ordered drift findings.
///
/// Both inputs are canonicalized on private copies. Entities are paired and
/// compared through [`Normalize`](crate::schema::Normalize), while repair SQL
/// and diffs are built from the definitions as given. An empty result means
/// the live schema matches the snapshot.
pub fn compare_schema_descriptions(
    schema_name: &str,
    version: &str,
    actual: &SchemaDescription,
    expected: &SchemaDescription,
) -> Vec<Summary> {
    info!(schema = schema_name, version, "Comparing schema descriptions");

    let actual = canonicalize(actual.clone());
    let expected = canonicalize(expected.clone());

    let mut summaries = Vec::new();
    for (kind, compare) in COMPARATORS {
        let found = compare(&actual, &expected);
        debug!(schema = schema_name, kind, drift = found.len(), "Compared {}", kind);
        summaries.extend(found);
    }

    summaries
}

pub(crate) fn docs_url(page: &str) -> String {
    format!("{}/{}", POSTGRES_DOCS_URL, page)
}
