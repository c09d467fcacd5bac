use super::Summary;
use super::named::compare_named_lists;
use crate::schema::SchemaDescription;
use crate::schema::sql::create_extension_statement;

/// Extensions installed beyond the expected set are not reported.
pub fn compare(actual: &SchemaDescription, expected: &SchemaDescription) -> Vec<Summary> {
    compare_named_lists(&actual.extensions, &expected.extensions, |extension, expected| {
        if extension.is_some() {
            return Vec::new();
        }

        vec![
            Summary::new(
                expected.clone(),
                format!("Missing extension {:?}", expected),
                "install the extension",
            )
            .with_statements([create_extension_statement(expected)]),
        ]
    })
}
