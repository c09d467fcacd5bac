//! SQL rendering for schema entities: the statements that create, drop, or
//! alter one entity in isolation.

use super::{
    ColumnDescription, ConstraintDescription, EnumDescription, FunctionDescription,
    IndexDescription, SequenceDescription, TableDescription, TriggerDescription, ViewDescription,
};

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn escape_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Terminate a catalog-provided definition with exactly one semicolon.
fn terminated(definition: &str) -> String {
    format!("{};", definition.trim().trim_end_matches(';').trim_end())
}

pub fn create_extension_statement(name: &str) -> String {
    format!("CREATE EXTENSION IF NOT EXISTS {};", quote_ident(name))
}

impl EnumDescription {
    pub fn create_statement(&self) -> String {
        let labels: Vec<String> = self.labels.iter().map(|l| escape_string(l)).collect();
        format!(
            "CREATE TYPE {} AS ENUM ({});",
            quote_ident(&self.name),
            labels.join(", ")
        )
    }

    pub fn drop_statement(&self) -> String {
        format!("DROP TYPE IF EXISTS {};", quote_ident(&self.name))
    }

    /// `ALTER TYPE ... ADD VALUE` appending the label after the last one.
    pub fn append_value_statement(&self, label: &str) -> String {
        format!(
            "ALTER TYPE {} ADD VALUE {};",
            quote_ident(&self.name),
            escape_string(label)
        )
    }

    pub fn add_value_statement(&self, label: &str, before: bool, neighbor: &str) -> String {
        format!(
            "ALTER TYPE {} ADD VALUE {} {} {};",
            quote_ident(&self.name),
            escape_string(label),
            if before { "BEFORE" } else { "AFTER" },
            escape_string(neighbor)
        )
    }
}

impl FunctionDescription {
    /// Catalog definitions are `CREATE OR REPLACE`, so this also redefines.
    pub fn create_statement(&self) -> String {
        terminated(&self.definition)
    }
}

impl SequenceDescription {
    pub fn create_statement(&self) -> String {
        format!(
            "CREATE SEQUENCE {} AS {} INCREMENT BY {} MINVALUE {} MAXVALUE {} START WITH {} {};",
            quote_ident(&self.name),
            self.type_name,
            self.increment,
            self.minimum_value,
            self.maximum_value,
            self.start_value,
            cycle_clause(&self.cycle_option)
        )
    }

    pub fn drop_statement(&self) -> String {
        format!("DROP SEQUENCE IF EXISTS {};", quote_ident(&self.name))
    }

    /// Statements altering `self` in place until it matches `target`, or
    /// `None` when a property differs that cannot be altered incrementally.
    pub fn alter_to_target(&self, target: &SequenceDescription) -> Option<Vec<String>> {
        if self.start_value != target.start_value {
            return None;
        }

        let mut clauses = Vec::new();
        if self.type_name != target.type_name {
            clauses.push(format!("AS {}", target.type_name));
        }
        if self.increment != target.increment {
            clauses.push(format!("INCREMENT BY {}", target.increment));
        }
        if self.minimum_value != target.minimum_value {
            clauses.push(format!("MINVALUE {}", target.minimum_value));
        }
        if self.maximum_value != target.maximum_value {
            clauses.push(format!("MAXVALUE {}", target.maximum_value));
        }
        if self.cycle_option != target.cycle_option {
            clauses.push(cycle_clause(&target.cycle_option).to_string());
        }

        if clauses.is_empty() {
            return Some(Vec::new());
        }

        Some(vec![format!(
            "ALTER SEQUENCE {} {};",
            quote_ident(&self.name),
            clauses.join(" ")
        )])
    }
}

fn cycle_clause(cycle_option: &str) -> &'static str {
    if cycle_option.eq_ignore_ascii_case("YES") {
        "CYCLE"
    } else {
        "NO CYCLE"
    }
}

impl TableDescription {
    /// `CREATE TABLE` followed by the table's constraints, indexes, and
    /// triggers, in an order that can be executed as-is.
    pub fn create_statements(&self) -> Vec<String> {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {}", c.definition()))
            .collect();

        let mut statements = vec![format!(
            "CREATE TABLE {} (\n{}\n);",
            quote_ident(&self.name),
            columns.join(",\n")
        )];

        statements.extend(self.indexes.iter().map(|i| i.create_statement(self)));
        statements.extend(self.constraints.iter().map(|c| c.create_statement(self)));
        statements.extend(self.triggers.iter().map(|t| t.create_statement()));
        statements
    }
}

impl ColumnDescription {
    /// Column definition as it appears inside `CREATE TABLE` or `ADD COLUMN`.
    pub fn definition(&self) -> String {
        let mut definition = format!("{} {}", quote_ident(&self.name), self.type_name);

        if self.is_generated.eq_ignore_ascii_case("ALWAYS") {
            definition.push_str(&format!(
                " GENERATED ALWAYS AS ({}) STORED",
                self.generation_expression
            ));
        } else if self.is_identity {
            let generation = if self.identity_generation.is_empty() {
                "BY DEFAULT"
            } else {
                &self.identity_generation
            };
            definition.push_str(&format!(" GENERATED {} AS IDENTITY", generation));
        } else if !self.default.is_empty() {
            definition.push_str(&format!(" DEFAULT {}", self.default));
        }

        if !self.is_nullable {
            definition.push_str(" NOT NULL");
        }

        definition
    }

    pub fn create_statement(&self, table: &TableDescription) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {};",
            quote_ident(&table.name),
            self.definition()
        )
    }

    pub fn drop_statement(&self, table: &TableDescription) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN IF EXISTS {};",
            quote_ident(&table.name),
            quote_ident(&self.name)
        )
    }

    /// Statements altering `self` in place until it matches `target`, or
    /// `None` when identity, generation, or other properties differ.
    pub fn alter_to_target(
        &self,
        table: &TableDescription,
        target: &ColumnDescription,
    ) -> Option<Vec<String>> {
        let comparable = |c: &ColumnDescription| ColumnDescription {
            index: -1,
            comment: String::new(),
            type_name: String::new(),
            character_maximum_length: 0,
            is_nullable: false,
            default: String::new(),
            ..c.clone()
        };
        if comparable(self) != comparable(target) {
            return None;
        }

        let prefix = format!(
            "ALTER TABLE {} ALTER COLUMN {}",
            quote_ident(&table.name),
            quote_ident(&self.name)
        );
        let mut statements = Vec::new();

        if self.type_name != target.type_name
            || self.character_maximum_length != target.character_maximum_length
        {
            statements.push(format!("{} TYPE {};", prefix, target.type_name));
        }
        if self.is_nullable != target.is_nullable {
            if target.is_nullable {
                statements.push(format!("{} DROP NOT NULL;", prefix));
            } else {
                statements.push(format!("{} SET NOT NULL;", prefix));
            }
        }
        if self.default != target.default {
            if target.default.is_empty() {
                statements.push(format!("{} DROP DEFAULT;", prefix));
            } else {
                statements.push(format!("{} SET DEFAULT {};", prefix, target.default));
            }
        }

        Some(statements)
    }
}

impl IndexDescription {
    /// Primary key, unique, and exclusion indexes are owned by a constraint.
    pub fn is_constraint_backed(&self) -> bool {
        !self.constraint_type.is_empty()
    }

    pub fn create_statement(&self, table: &TableDescription) -> String {
        if self.is_constraint_backed() {
            format!(
                "ALTER TABLE {} ADD CONSTRAINT {} {};",
                quote_ident(&table.name),
                quote_ident(&self.name),
                self.constraint_definition
            )
        } else {
            terminated(&self.index_definition)
        }
    }

    pub fn drop_statement(&self, table: &TableDescription) -> String {
        if self.is_constraint_backed() {
            format!(
                "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
                quote_ident(&table.name),
                quote_ident(&self.name)
            )
        } else {
            format!("DROP INDEX IF EXISTS {};", quote_ident(&self.name))
        }
    }
}

impl ConstraintDescription {
    pub fn create_statement(&self, table: &TableDescription) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {};",
            quote_ident(&table.name),
            quote_ident(&self.name),
            self.constraint_definition
        )
    }

    pub fn drop_statement(&self, table: &TableDescription) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
            quote_ident(&table.name),
            quote_ident(&self.name)
        )
    }
}

impl TriggerDescription {
    pub fn create_statement(&self) -> String {
        terminated(&self.definition)
    }

    pub fn drop_statement(&self, table: &TableDescription) -> String {
        format!(
            "DROP TRIGGER IF EXISTS {} ON {};",
            quote_ident(&self.name),
            quote_ident(&table.name)
        )
    }
}

impl ViewDescription {
    pub fn create_statement(&self) -> String {
        format!(
            "CREATE VIEW {} AS {}",
            quote_ident(&self.name),
            terminated(&self.definition)
        )
    }

    pub fn drop_statement(&self) -> String {
        format!("DROP VIEW IF EXISTS {};", quote_ident(&self.name))
    }
}
