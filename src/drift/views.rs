use super::Summary;
use super::named::compare_named_lists;
use crate::schema::SchemaDescription;

pub fn compare(actual: &SchemaDescription, expected: &SchemaDescription) -> Vec<Summary> {
    compare_named_lists(&actual.views, &expected.views, |view, expected| {
        let name = expected.name.clone();

        let Some(view) = view else {
            return vec![
                Summary::new(
                    name.clone(),
                    format!("Missing view {:?}", name),
                    "define the view",
                )
                .with_statements([expected.create_statement()]),
            ];
        };

        vec![
            Summary::new(
                name.clone(),
                format!("Unexpected definition of view {:?}", name),
                "redefine the view",
            )
            .with_diff(&expected.definition, &view.definition)
            .with_statements([expected.drop_statement(), expected.create_statement()]),
        ]
    })
}
