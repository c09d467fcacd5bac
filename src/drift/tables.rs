use super::named::{compare_named_lists, compare_named_lists_strict};
use super::{Summary, docs_url};
use crate::schema::{SchemaDescription, TableDescription};

pub fn compare(actual: &SchemaDescription, expected: &SchemaDescription) -> Vec<Summary> {
    compare_named_lists(&actual.tables, &expected.tables, |table, expected| {
        let Some(table) = table else {
            return vec![
                Summary::new(
                    expected.name.clone(),
                    format!("Missing table {:?}", expected.name),
                    "define the table",
                )
                .with_statements(expected.create_statements())
                .with_url_hint(docs_url("sql-createtable.html")),
            ];
        };

        let mut summaries = compare_columns(table, expected);
        summaries.extend(compare_constraints(table, expected));
        summaries.extend(compare_indexes(table, expected));
        summaries.extend(compare_triggers(table, expected));
        summaries
    })
}

fn qualified(table: &TableDescription, name: &str) -> String {
    format!("{}.{}", table.name, name)
}

fn compare_columns(table: &TableDescription, expected_table: &TableDescription) -> Vec<Summary> {
    compare_named_lists_strict(
        &table.columns,
        &expected_table.columns,
        |column, expected| {
            let name = qualified(expected_table, &expected.name);

            let Some(column) = column else {
                return vec![
                    Summary::new(
                        name.clone(),
                        format!("Missing column {:?}", name),
                        "define the column",
                    )
                    .with_statements([expected.create_statement(expected_table)]),
                ];
            };

            match column.alter_to_target(expected_table, expected) {
                Some(statements) => vec![
                    Summary::new(
                        name.clone(),
                        format!("Unexpected properties of column {:?}", name),
                        "alter the column",
                    )
                    .with_diff(expected, column)
                    .with_statements(statements),
                ],
                None => vec![
                    Summary::new(
                        name.clone(),
                        format!("Unexpected properties of column {:?}", name),
                        "redefine the column",
                    )
                    .with_diff(expected, column)
                    .with_url_hint(docs_url("sql-altertable.html")),
                ],
            }
        },
        |extras| {
            extras
                .iter()
                .map(|column| {
                    let name = qualified(table, &column.name);
                    Summary::new(
                        name.clone(),
                        format!("Unexpected column {:?}", name),
                        "drop the column",
                    )
                    .with_statements([column.drop_statement(table)])
                })
                .collect()
        },
    )
}

fn compare_constraints(
    table: &TableDescription,
    expected_table: &TableDescription,
) -> Vec<Summary> {
    compare_named_lists_strict(
        &table.constraints,
        &expected_table.constraints,
        |constraint, expected| {
            let name = qualified(expected_table, &expected.name);

            let Some(constraint) = constraint else {
                return vec![
                    Summary::new(
                        name.clone(),
                        format!("Missing constraint {:?}", name),
                        "define the constraint",
                    )
                    .with_statements([expected.create_statement(expected_table)]),
                ];
            };

            vec![
                Summary::new(
                    name.clone(),
                    format!("Unexpected properties of constraint {:?}", name),
                    "redefine the constraint",
                )
                .with_diff(expected, constraint)
                .with_statements([
                    constraint.drop_statement(table),
                    expected.create_statement(expected_table),
                ]),
            ]
        },
        |extras| {
            extras
                .iter()
                .map(|constraint| {
                    let name = qualified(table, &constraint.name);
                    Summary::new(
                        name.clone(),
                        format!("Unexpected constraint {:?}", name),
                        "drop the constraint",
                    )
                    .with_statements([constraint.drop_statement(table)])
                })
                .collect()
        },
    )
}

fn compare_indexes(table: &TableDescription, expected_table: &TableDescription) -> Vec<Summary> {
    compare_named_lists_strict(
        &table.indexes,
        &expected_table.indexes,
        |index, expected| {
            let name = qualified(expected_table, &expected.name);

            let Some(index) = index else {
                return vec![
                    Summary::new(
                        name.clone(),
                        format!("Missing index {:?}", name),
                        "define the index",
                    )
                    .with_statements([expected.create_statement(expected_table)]),
                ];
            };

            vec![
                Summary::new(
                    name.clone(),
                    format!("Unexpected properties of index {:?}", name),
                    "redefine the index",
                )
                .with_diff(expected, index)
                .with_statements([
                    index.drop_statement(table),
                    expected.create_statement(expected_table),
                ]),
            ]
        },
        |extras| {
            extras
                .iter()
                .map(|index| {
                    let name = qualified(table, &index.name);
                    Summary::new(
                        name.clone(),
                        format!("Unexpected index {:?}", name),
                        "drop the index",
                    )
                    .with_statements([index.drop_statement(table)])
                })
                .collect()
        },
    )
}

fn compare_triggers(table: &TableDescription, expected_table: &TableDescription) -> Vec<Summary> {
    compare_named_lists_strict(
        &table.triggers,
        &expected_table.triggers,
        |trigger, expected| {
            let name = qualified(expected_table, &expected.name);

            let Some(trigger) = trigger else {
                return vec![
                    Summary::new(
                        name.clone(),
                        format!("Missing trigger {:?}", name),
                        "define the trigger",
                    )
                    .with_statements([expected.create_statement()]),
                ];
            };

            vec![
                Summary::new(
                    name.clone(),
                    format!("Unexpected definition of trigger {:?}", name),
                    "redefine the trigger",
                )
                .with_diff(&expected.definition, &trigger.definition)
                .with_statements([trigger.drop_statement(table), expected.create_statement()]),
            ]
        },
        |extras| {
            extras
                .iter()
                .map(|trigger| {
                    let name = qualified(table, &trigger.name);
                    Summary::new(
                        name.clone(),
                        format!("Unexpected trigger {:?}", name),
                        "drop the trigger",
                    )
                    .with_statements([trigger.drop_statement(table)])
                })
                .collect()
        },
    )
}
