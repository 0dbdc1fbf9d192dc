//! Normalized schema description shapes.
//!
//! These are the stable contract consumed by callers building migrations or
//! validation: backend-specific introspection output is flattened into
//! [`TableDescription`], [`ColumnDescription`], and [`IndexDescription`]
//! regardless of which driver produced it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Complete description of one table: columns plus indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescription {
    pub name: String,
    pub columns: Vec<ColumnDescription>,
    pub indexes: Vec<IndexDescription>,
}

impl TableDescription {
    /// Create an empty description for a table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescription> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up an index by name.
    pub fn index(&self, name: &str) -> Option<&IndexDescription> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// Normalized column description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescription {
    pub name: String,
    /// Full declared type (e.g., `varchar(30)`, `bigint unsigned`)
    pub data_type: String,
    /// Declared character length, where the backend exposes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    pub nullable: bool,
    /// Default value with appropriate JSON type based on column data type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ColumnDescription {
    /// Create a new column description.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            length: None,
            nullable,
            default_value: None,
            comment: None,
        }
    }

    /// Set the declared character length.
    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    /// Set the default value (as JSON value).
    pub fn with_default(mut self, default_value: serde_json::Value) -> Self {
        self.default_value = Some(default_value);
        self
    }

    /// Set the default value from a string, converting to the appropriate
    /// JSON type based on the column's data_type.
    pub fn with_default_str(mut self, default_str: &str) -> Self {
        self.default_value = Some(parse_default_value(default_str, &self.data_type));
        self
    }

    /// Set the column comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Kind of index, normalized across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Primary,
    Unique,
    Index,
    Fulltext,
}

impl IndexKind {
    /// Parse from a backend-specific type string.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "primary" | "primary key" => Self::Primary,
            "unique" => Self::Unique,
            "fulltext" => Self::Fulltext,
            _ => Self::Index,
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Unique => write!(f, "unique"),
            Self::Index => write!(f, "index"),
            Self::Fulltext => write!(f, "fulltext"),
        }
    }
}

/// Normalized index description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub kind: IndexKind,
    /// Columns in index order.
    pub columns: Vec<String>,
    /// Per-column prefix lengths (MySQL `SUB_PART`); empty elsewhere.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub lengths: HashMap<String, u32>,
}

impl IndexDescription {
    /// Create a new index description.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: IndexKind::Index,
            columns,
            lengths: HashMap::new(),
        }
    }

    /// Set the index kind.
    pub fn with_kind(mut self, kind: IndexKind) -> Self {
        self.kind = kind;
        self
    }

    /// Record a prefix length for one column.
    pub fn with_length(mut self, column: impl Into<String>, length: u32) -> Self {
        self.lengths.insert(column.into(), length);
        self
    }
}

/// Parse a default value string into the appropriate JSON type based on
/// the column data type.
///
/// - Integer types (int, bigint, smallint, tinyint) → JSON Number
/// - Float types (float, double, real) → JSON Number
/// - Boolean types → JSON Boolean
/// - JSON/JSONB types → Parsed JSON value
/// - Decimal/numeric → JSON String (preserve precision)
/// - String types and expressions (CURRENT_TIMESTAMP, nextval) → JSON String
pub fn parse_default_value(default_str: &str, data_type: &str) -> serde_json::Value {
    let dt_lower = data_type.to_lowercase();

    if dt_lower.contains("int") || dt_lower.contains("serial") {
        if let Ok(n) = default_str.parse::<i64>() {
            return serde_json::Value::Number(n.into());
        }
    }

    if (dt_lower.contains("float") || dt_lower.contains("double") || dt_lower == "real")
        && !dt_lower.contains("decimal")
        && !dt_lower.contains("numeric")
    {
        if let Ok(n) = default_str.parse::<f64>() {
            if let Some(num) = serde_json::Number::from_f64(n) {
                return serde_json::Value::Number(num);
            }
        }
    }

    if dt_lower.contains("bool") {
        match default_str.to_lowercase().as_str() {
            "true" | "1" | "t" => return serde_json::Value::Bool(true),
            "false" | "0" | "f" => return serde_json::Value::Bool(false),
            _ => {}
        }
    }

    if dt_lower == "json" || dt_lower == "jsonb" {
        if let Ok(parsed) = serde_json::from_str(default_str) {
            return parsed;
        }
    }

    // Everything else: decimal/numeric, varchar, text, expressions, etc.
    serde_json::Value::String(default_str.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_description_lookup() {
        let mut desc = TableDescription::new("users");
        desc.columns
            .push(ColumnDescription::new("id", "bigint", false));
        desc.indexes
            .push(IndexDescription::new("users_pkey", vec!["id".to_string()]));

        assert!(desc.column("id").is_some());
        assert!(desc.column("missing").is_none());
        assert!(desc.index("users_pkey").is_some());
    }

    #[test]
    fn test_column_builder() {
        let col = ColumnDescription::new("email", "varchar(80)", false)
            .with_length(80)
            .with_comment("login address");

        assert_eq!(col.length, Some(80));
        assert!(!col.nullable);
        assert_eq!(col.comment.as_deref(), Some("login address"));
    }

    #[test]
    fn test_index_kind_parsing() {
        assert_eq!(IndexKind::parse("PRIMARY"), IndexKind::Primary);
        assert_eq!(IndexKind::parse("unique"), IndexKind::Unique);
        assert_eq!(IndexKind::parse("FULLTEXT"), IndexKind::Fulltext);
        assert_eq!(IndexKind::parse("BTREE"), IndexKind::Index);
    }

    #[test]
    fn test_index_builder() {
        let idx = IndexDescription::new("idx_title", vec!["title".to_string()])
            .with_kind(IndexKind::Fulltext)
            .with_length("title", 191);

        assert_eq!(idx.kind, IndexKind::Fulltext);
        assert_eq!(idx.lengths.get("title"), Some(&191));
    }

    #[test]
    fn test_parse_default_value_integer_types() {
        assert_eq!(
            parse_default_value("42", "int"),
            serde_json::Value::Number(42.into())
        );
        assert_eq!(
            parse_default_value("-100", "bigint"),
            serde_json::Value::Number((-100).into())
        );
        assert_eq!(
            parse_default_value("5", "serial"),
            serde_json::Value::Number(5.into())
        );
    }

    #[test]
    fn test_parse_default_value_decimal_stays_string() {
        assert_eq!(
            parse_default_value("123.456789", "decimal(10,6)"),
            serde_json::Value::String("123.456789".to_string())
        );
    }

    #[test]
    fn test_parse_default_value_boolean() {
        assert_eq!(
            parse_default_value("true", "boolean"),
            serde_json::Value::Bool(true)
        );
        assert_eq!(
            parse_default_value("0", "bool"),
            serde_json::Value::Bool(false)
        );
    }

    #[test]
    fn test_parse_default_value_expressions() {
        assert_eq!(
            parse_default_value("CURRENT_TIMESTAMP", "timestamp"),
            serde_json::Value::String("CURRENT_TIMESTAMP".to_string())
        );
        assert_eq!(
            parse_default_value("nextval('users_id_seq'::regclass)", "bigint"),
            serde_json::Value::String("nextval('users_id_seq'::regclass)".to_string())
        );
    }

    #[test]
    fn test_parse_default_value_json_types() {
        assert_eq!(parse_default_value("{}", "json"), serde_json::json!({}));
        assert_eq!(
            parse_default_value(r#"{"key": "value"}"#, "jsonb"),
            serde_json::json!({"key": "value"})
        );
        assert_eq!(
            parse_default_value("not valid json", "json"),
            serde_json::Value::String("not valid json".to_string())
        );
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let col = ColumnDescription::new("name", "text", true);
        let json = serde_json::to_string(&col).unwrap();
        assert!(!json.contains("length"));
        assert!(!json.contains("default_value"));
        assert!(!json.contains("comment"));
    }
}
