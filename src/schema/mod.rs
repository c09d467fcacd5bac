//! Structural snapshots of a database schema.
//!
//! A [`SchemaDescription`] is produced both by live introspection and by
//! deserializing historical snapshot files, so the serialized field names are
//! a compatibility boundary and must not change.

pub mod normalize;
pub mod sql;

pub use normalize::{Normalize, canonicalize};

use serde::{Deserialize, Deserializer, Serialize};

/// Capability shared by every entity that lives in a name-keyed collection.
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for String {
    fn name(&self) -> &str {
        self
    }
}

/// Full structural snapshot of one schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaDescription {
    #[serde(default, deserialize_with = "null_as_default")]
    pub extensions: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub enums: Vec<EnumDescription>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub functions: Vec<FunctionDescription>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sequences: Vec<SequenceDescription>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tables: Vec<TableDescription>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub views: Vec<ViewDescription>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EnumDescription {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FunctionDescription {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SequenceDescription {
    pub name: String,
    pub type_name: String,
    pub start_value: i64,
    pub minimum_value: i64,
    pub maximum_value: i64,
    pub increment: i64,
    pub cycle_option: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TableDescription {
    pub name: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: Vec<ColumnDescription>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub indexes: Vec<IndexDescription>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub constraints: Vec<ConstraintDescription>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub triggers: Vec<TriggerDescription>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ColumnDescription {
    pub name: String,
    /// Ordinal position within the table; `-1` once normalized away.
    pub index: i32,
    pub type_name: String,
    pub is_nullable: bool,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub character_maximum_length: i32,
    #[serde(default)]
    pub is_identity: bool,
    #[serde(default)]
    pub identity_generation: String,
    #[serde(default)]
    pub is_generated: String,
    #[serde(default)]
    pub generation_expression: String,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndexDescription {
    pub name: String,
    pub is_primary_key: bool,
    pub is_unique: bool,
    #[serde(default)]
    pub is_exclusion: bool,
    #[serde(default)]
    pub is_deferrable: bool,
    pub index_definition: String,
    #[serde(default)]
    pub constraint_type: String,
    #[serde(default)]
    pub constraint_definition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConstraintDescription {
    pub name: String,
    pub constraint_type: String,
    #[serde(default)]
    pub ref_table_name: String,
    #[serde(default)]
    pub is_deferrable: bool,
    pub constraint_definition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TriggerDescription {
    pub name: String,
    pub definition: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ViewDescription {
    pub name: String,
    pub definition: String,
}

macro_rules! impl_named {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Named for $ty {
                fn name(&self) -> &str {
                    &self.name
                }
            }
        )*
    };
}

impl_named!(
    EnumDescription,
    FunctionDescription,
    SequenceDescription,
    TableDescription,
    ColumnDescription,
    IndexDescription,
    ConstraintDescription,
    TriggerDescription,
    ViewDescription,
);

/// Snapshot files written by older tooling encode empty collections as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
