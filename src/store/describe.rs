//! Catalog introspection producing [`SchemaDescription`]s.

use crate::schema::{
    ColumnDescription, ConstraintDescription, EnumDescription, FunctionDescription,
    IndexDescription, SchemaDescription, SequenceDescription, TableDescription,
    TriggerDescription, ViewDescription,
};
use anyhow::{Context, Result};
use sqlx::PgPool;
use std::collections::BTreeMap;
use tracing::debug;

const USER_NAMESPACES: &str =
    "n.nspname NOT LIKE 'pg\\_%' AND n.nspname <> 'information_schema'";

type TableKey = (String, String);

/// Describe every non-system namespace of the database.
pub async fn describe_schemas(pool: &PgPool) -> Result<BTreeMap<String, SchemaDescription>> {
    let mut descriptions: BTreeMap<String, SchemaDescription> = BTreeMap::new();

    for (namespace, name) in fetch_extensions(pool).await? {
        descriptions.entry(namespace).or_default().extensions.push(name);
    }
    for (namespace, description) in fetch_enums(pool).await? {
        descriptions.entry(namespace).or_default().enums.push(description);
    }
    for (namespace, description) in fetch_functions(pool).await? {
        descriptions.entry(namespace).or_default().functions.push(description);
    }
    for (namespace, description) in fetch_sequences(pool).await? {
        descriptions.entry(namespace).or_default().sequences.push(description);
    }
    for (namespace, description) in fetch_views(pool).await? {
        descriptions.entry(namespace).or_default().views.push(description);
    }

    let mut tables = fetch_tables(pool).await?;
    for (key, column) in fetch_columns(pool).await? {
        if let Some(table) = tables.get_mut(&key) {
            table.columns.push(column);
        }
    }
    for (key, index) in fetch_indexes(pool).await? {
        if let Some(table) = tables.get_mut(&key) {
            table.indexes.push(index);
        }
    }
    for (key, constraint) in fetch_constraints(pool).await? {
        if let Some(table) = tables.get_mut(&key) {
            table.constraints.push(constraint);
        }
    }
    for (key, trigger) in fetch_triggers(pool).await? {
        if let Some(table) = tables.get_mut(&key) {
            table.triggers.push(trigger);
        }
    }
    for ((namespace, _), table) in tables {
        descriptions.entry(namespace).or_default().tables.push(table);
    }

    debug!(namespaces = descriptions.len(), "Described database");
    Ok(descriptions)
}

async fn fetch_extensions(pool: &PgPool) -> Result<Vec<(String, String)>> {
    let sql = format!(
        r#"
        SELECT n.nspname::text, e.extname::text
        FROM pg_catalog.pg_extension e
        JOIN pg_catalog.pg_namespace n ON n.oid = e.extnamespace
        WHERE {} AND e.extname <> 'plpgsql'
        ORDER BY 1, 2
        "#,
        USER_NAMESPACES
    );
    sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to fetch extensions")
}

async fn fetch_enums(pool: &PgPool) -> Result<Vec<(String, EnumDescription)>> {
    let sql = format!(
        r#"
        SELECT n.nspname::text, t.typname::text, array_agg(e.enumlabel::text ORDER BY e.enumsortorder)
        FROM pg_catalog.pg_type t
        JOIN pg_catalog.pg_enum e ON e.enumtypid = t.oid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
        WHERE {}
        GROUP BY 1, 2
        ORDER BY 1, 2
        "#,
        USER_NAMESPACES
    );
    let rows: Vec<(String, String, Vec<String>)> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to fetch enums")?;

    Ok(rows
        .into_iter()
        .map(|(namespace, name, labels)| (namespace, EnumDescription { name, labels }))
        .collect())
}

async fn fetch_functions(pool: &PgPool) -> Result<Vec<(String, FunctionDescription)>> {
    let sql = format!(
        r#"
        SELECT n.nspname::text, p.proname::text, pg_catalog.pg_get_functiondef(p.oid)
        FROM pg_catalog.pg_proc p
        JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
        WHERE {}
            AND p.prokind = 'f'
            AND NOT EXISTS (
                SELECT 1 FROM pg_catalog.pg_depend d
                WHERE d.objid = p.oid AND d.deptype = 'e'
            )
        ORDER BY 1, 2
        "#,
        USER_NAMESPACES
    );
    let rows: Vec<(String, String, String)> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to fetch functions")?;

    Ok(rows
        .into_iter()
        .map(|(namespace, name, definition)| {
            (namespace, FunctionDescription { name, definition })
        })
        .collect())
}

async fn fetch_sequences(pool: &PgPool) -> Result<Vec<(String, SequenceDescription)>> {
    let rows: Vec<(String, String, String, i64, i64, i64, i64, String)> = sqlx::query_as(
        r#"
        SELECT
            sequence_schema::text,
            sequence_name::text,
            data_type::text,
            start_value::bigint,
            minimum_value::bigint,
            maximum_value::bigint,
            increment::bigint,
            cycle_option::text
        FROM information_schema.sequences
        WHERE sequence_schema NOT LIKE 'pg\_%' AND sequence_schema <> 'information_schema'
        ORDER BY 1, 2
        "#,
    )
    .fetch_all(pool)
    .await
    .context("Failed to fetch sequences")?;

    Ok(rows
        .into_iter()
        .map(
            |(namespace, name, type_name, start_value, minimum_value, maximum_value, increment, cycle_option)| {
                (
                    namespace,
                    SequenceDescription {
                        name,
                        type_name,
                        start_value,
                        minimum_value,
                        maximum_value,
                        increment,
                        cycle_option,
                    },
                )
            },
        )
        .collect())
}

async fn fetch_views(pool: &PgPool) -> Result<Vec<(String, ViewDescription)>> {
    let sql = format!(
        r#"
        SELECT n.nspname::text, c.relname::text, pg_catalog.pg_get_viewdef(c.oid)
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE {} AND c.relkind = 'v'
        ORDER BY 1, 2
        "#,
        USER_NAMESPACES
    );
    let rows: Vec<(String, String, String)> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to fetch views")?;

    Ok(rows
        .into_iter()
        .map(|(namespace, name, definition)| (namespace, ViewDescription { name, definition }))
        .collect())
}

async fn fetch_tables(pool: &PgPool) -> Result<BTreeMap<TableKey, TableDescription>> {
    let sql = format!(
        r#"
        SELECT
            n.nspname::text,
            c.relname::text,
            COALESCE(pg_catalog.obj_description(c.oid, 'pg_class'), '')
        FROM pg_catalog.pg_class c
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE {} AND c.relkind IN ('r', 'p')
        "#,
        USER_NAMESPACES
    );
    let rows: Vec<(String, String, String)> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to fetch tables")?;

    Ok(rows
        .into_iter()
        .map(|(namespace, name, comment)| {
            let table = TableDescription {
                name: name.clone(),
                comment,
                ..Default::default()
            };
            ((namespace, name), table)
        })
        .collect())
}

async fn fetch_columns(pool: &PgPool) -> Result<Vec<(TableKey, ColumnDescription)>> {
    let sql = format!(
        r#"
        SELECT
            n.nspname::text,
            c.relname::text,
            a.attname::text,
            a.attnum::int4,
            pg_catalog.format_type(a.atttypid, a.atttypmod),
            NOT a.attnotnull,
            CASE WHEN a.attgenerated = '' THEN COALESCE(pg_catalog.pg_get_expr(d.adbin, d.adrelid), '') ELSE '' END,
            CASE WHEN t.typname IN ('varchar', 'bpchar') AND a.atttypmod > 4 THEN a.atttypmod - 4 ELSE 0 END,
            a.attidentity <> '',
            CASE a.attidentity WHEN 'a' THEN 'ALWAYS' WHEN 'd' THEN 'BY DEFAULT' ELSE '' END,
            CASE WHEN a.attgenerated = 's' THEN 'ALWAYS' ELSE 'NEVER' END,
            CASE WHEN a.attgenerated <> '' THEN COALESCE(pg_catalog.pg_get_expr(d.adbin, d.adrelid), '') ELSE '' END,
            COALESCE(pg_catalog.col_description(c.oid, a.attnum), '')
        FROM pg_catalog.pg_attribute a
        JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        JOIN pg_catalog.pg_type t ON t.oid = a.atttypid
        LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
        WHERE {} AND c.relkind IN ('r', 'p') AND a.attnum > 0 AND NOT a.attisdropped
        ORDER BY 1, 2, 4
        "#,
        USER_NAMESPACES
    );

    type ColumnRow = (
        String,
        String,
        String,
        i32,
        String,
        bool,
        String,
        i32,
        bool,
        String,
        String,
        String,
        String,
    );
    let rows: Vec<ColumnRow> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to fetch columns")?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let column = ColumnDescription {
                name: row.2,
                index: row.3,
                type_name: row.4,
                is_nullable: row.5,
                default: row.6,
                character_maximum_length: row.7,
                is_identity: row.8,
                identity_generation: row.9,
                is_generated: row.10,
                generation_expression: row.11,
                comment: row.12,
            };
            ((row.0, row.1), column)
        })
        .collect())
}

async fn fetch_indexes(pool: &PgPool) -> Result<Vec<(TableKey, IndexDescription)>> {
    let sql = format!(
        r#"
        SELECT
            n.nspname::text,
            t.relname::text,
            i.relname::text,
            ix.indisprimary,
            ix.indisunique,
            ix.indisexclusion,
            COALESCE(con.condeferrable, false),
            pg_catalog.pg_get_indexdef(ix.indexrelid),
            CASE con.contype
                WHEN 'p' THEN 'PRIMARY KEY'
                WHEN 'u' THEN 'UNIQUE'
                WHEN 'x' THEN 'EXCLUDE'
                ELSE ''
            END,
            COALESCE(pg_catalog.pg_get_constraintdef(con.oid), '')
        FROM pg_catalog.pg_index ix
        JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
        JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        LEFT JOIN pg_catalog.pg_constraint con
            ON con.conindid = ix.indexrelid AND con.contype IN ('p', 'u', 'x')
        WHERE {} AND t.relkind IN ('r', 'p')
        ORDER BY 1, 2, 3
        "#,
        USER_NAMESPACES
    );

    type IndexRow = (String, String, String, bool, bool, bool, bool, String, String, String);
    let rows: Vec<IndexRow> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to fetch indexes")?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let index = IndexDescription {
                name: row.2,
                is_primary_key: row.3,
                is_unique: row.4,
                is_exclusion: row.5,
                is_deferrable: row.6,
                index_definition: row.7,
                constraint_type: row.8,
                constraint_definition: row.9,
            };
            ((row.0, row.1), index)
        })
        .collect())
}

async fn fetch_constraints(pool: &PgPool) -> Result<Vec<(TableKey, ConstraintDescription)>> {
    let sql = format!(
        r#"
        SELECT
            n.nspname::text,
            t.relname::text,
            con.conname::text,
            CASE con.contype
                WHEN 'c' THEN 'CHECK'
                WHEN 'f' THEN 'FOREIGN KEY'
                WHEN 't' THEN 'TRIGGER'
                ELSE con.contype::text
            END,
            COALESCE(rt.relname::text, ''),
            con.condeferrable,
            pg_catalog.pg_get_constraintdef(con.oid)
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class t ON t.oid = con.conrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
        LEFT JOIN pg_catalog.pg_class rt ON rt.oid = con.confrelid
        WHERE {} AND con.contype IN ('c', 'f', 't')
        ORDER BY 1, 2, 3
        "#,
        USER_NAMESPACES
    );

    type ConstraintRow = (String, String, String, String, String, bool, String);
    let rows: Vec<ConstraintRow> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to fetch constraints")?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let constraint = ConstraintDescription {
                name: row.2,
                constraint_type: row.3,
                ref_table_name: row.4,
                is_deferrable: row.5,
                constraint_definition: row.6,
            };
            ((row.0, row.1), constraint)
        })
        .collect())
}

async fn fetch_triggers(pool: &PgPool) -> Result<Vec<(TableKey, TriggerDescription)>> {
    let sql = format!(
        r#"
        SELECT n.nspname::text, c.relname::text, tg.tgname::text, pg_catalog.pg_get_triggerdef(tg.oid)
        FROM pg_catalog.pg_trigger tg
        JOIN pg_catalog.pg_class c ON c.oid = tg.tgrelid
        JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
        WHERE {} AND NOT tg.tgisinternal
        ORDER BY 1, 2, 3
        "#,
        USER_NAMESPACES
    );
    let rows: Vec<(String, String, String, String)> = sqlx::query_as(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to fetch triggers")?;

    Ok(rows
        .into_iter()
        .map(|(namespace, table, name, definition)| {
            ((namespace, table), TriggerDescription { name, definition })
        })
        .collect())
}
