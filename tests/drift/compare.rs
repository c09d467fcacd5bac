use schemaflow::drift::compare_schema_descriptions;
use schemaflow::schema::SchemaDescription;

fn fixture() -> SchemaDescription {
    serde_json::from_str(include_str!("../fixtures/frontend.json")).unwrap()
}

fn set_enum_labels(description: &mut SchemaDescription, labels: &[&str]) {
    description.enums[0].labels = labels.iter().map(|l| l.to_string()).collect();
}

#[test]
fn test_snapshot_shape_is_preserved() {
    let description = fixture();
    assert_eq!(description.tables[0].columns.len(), 4);
    assert!(description.tables[0].constraints.is_empty());

    let value = serde_json::to_value(&description).unwrap();
    assert!(value["Tables"][0]["Columns"][0]["TypeName"].is_string());
    assert!(value["Enums"][0]["Labels"].is_array());

    let reparsed: SchemaDescription = serde_json::from_value(value).unwrap();
    assert_eq!(reparsed, description);
}

#[test]
fn test_identical_descriptions_have_no_drift() {
    let description = fixture();
    let summaries = compare_schema_descriptions("frontend", "v5.0.0", &description, &description);
    assert!(summaries.is_empty(), "{:?}", summaries);
}

#[test]
fn test_introspection_order_does_not_matter() {
    let expected = fixture();
    let mut actual = fixture();
    actual.tables[0].columns.reverse();
    actual.tables[0].indexes.reverse();

    let summaries = compare_schema_descriptions("frontend", "v5.0.0", &actual, &expected);
    assert!(summaries.is_empty(), "{:?}", summaries);
}

#[test]
fn test_missing_enum_label_is_added_in_place() {
    let expected = fixture();
    let mut actual = fixture();
    set_enum_labels(&mut actual, &["active", "deleted"]);

    let summaries = compare_schema_descriptions("frontend", "v5.0.0", &actual, &expected);

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].name(), "user_status");
    assert_eq!(
        summaries[0].statements().unwrap(),
        ["ALTER TYPE \"user_status\" ADD VALUE 'suspended' AFTER 'active';"]
    );
    assert!(summaries[0].render_diff().unwrap().contains("suspended"));
}

#[test]
fn test_extra_enum_label_forces_redefinition() {
    let mut expected = fixture();
    set_enum_labels(&mut expected, &["active", "suspended"]);
    let mut actual = fixture();
    set_enum_labels(&mut actual, &["active", "suspended", "banned"]);

    let summaries = compare_schema_descriptions("frontend", "v5.0.0", &actual, &expected);

    assert_eq!(summaries.len(), 1);
    let statements = summaries[0].statements().unwrap();
    assert_eq!(statements.len(), 2);
    assert!(statements[0].starts_with("DROP TYPE"));
    assert!(statements[1].starts_with("CREATE TYPE \"user_status\" AS ENUM"));
    assert!(summaries[0].url_hint().unwrap().ends_with("sql-altertype.html"));
}

#[test]
fn test_missing_objects_are_created() {
    let expected = fixture();
    let mut actual = fixture();
    actual.extensions.clear();
    actual.views.clear();
    actual.tables.clear();

    let summaries = compare_schema_descriptions("frontend", "v5.0.0", &actual, &expected);
    let names: Vec<&str> = summaries.iter().map(|s| s.name()).collect();
    assert_eq!(names, vec!["pg_trgm", "users", "active_users"]);

    for summary in &summaries {
        assert!(summary.statements().is_some_and(|s| !s.is_empty()));
    }
    assert_eq!(
        summaries[0].statements().unwrap(),
        ["CREATE EXTENSION IF NOT EXISTS \"pg_trgm\";"]
    );
}

#[test]
fn test_function_whitespace_and_comments_are_ignored() {
    let expected = fixture();
    let mut actual = fixture();
    actual.functions[0].definition = actual.functions[0]
        .definition
        .replace(" -- bump", "")
        .replace("\n  ", "\n      ");

    let summaries = compare_schema_descriptions("frontend", "v5.0.0", &actual, &expected);
    assert!(summaries.is_empty(), "{:?}", summaries);
}
