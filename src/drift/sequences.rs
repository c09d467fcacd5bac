use super::Summary;
use super::named::compare_named_lists;
use crate::schema::SchemaDescription;

pub fn compare(actual: &SchemaDescription, expected: &SchemaDescription) -> Vec<Summary> {
    compare_named_lists(&actual.sequences, &expected.sequences, |sequence, expected| {
        let name = expected.name.clone();

        let Some(sequence) = sequence else {
            return vec![
                Summary::new(
                    name.clone(),
                    format!("Missing sequence {:?}", name),
                    "define the sequence",
                )
                .with_statements([expected.create_statement()]),
            ];
        };

        let problem = format!("Unexpected properties of sequence {:?}", name);
        let summary = match sequence.alter_to_target(expected) {
            Some(statements) => {
                Summary::new(name, problem, "alter the sequence").with_statements(statements)
            }
            None => Summary::new(name, problem, "redefine the sequence")
                .with_statements([expected.drop_statement(), expected.create_statement()]),
        };

        vec![summary.with_diff(expected, sequence)]
    })
}
