use super::Summary;
use super::named::compare_named_lists;
use crate::schema::SchemaDescription;

pub fn compare(actual: &SchemaDescription, expected: &SchemaDescription) -> Vec<Summary> {
    compare_named_lists(&actual.functions, &expected.functions, |function, expected| {
        let name = expected.name.clone();

        match function {
            None => vec![
                Summary::new(
                    name.clone(),
                    format!("Missing function {:?}", name),
                    "define the function",
                )
                .with_statements([expected.create_statement()]),
            ],
            Some(function) => vec![
                Summary::new(
                    name.clone(),
                    format!("Unexpected definition of function {:?}", name),
                    "replace the function definition",
                )
                .with_diff(&expected.definition, &function.definition)
                .with_statements([expected.create_statement()]),
            ],
        }
    })
}
