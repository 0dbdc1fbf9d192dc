//! Integration tests for schema introspection.
//!
//! A SQLite fixture database is built with a table, two indexes, and a
//! view, then introspected through the normalized dialect interface.

use db_registry::{Connection, ConnectionRegistry, DbError, DbPool, IndexKind};
use std::sync::Arc;
use tempfile::NamedTempFile;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Create a registry with one on-disk SQLite connection and a seeded schema.
async fn setup() -> (ConnectionRegistry, Arc<Connection>) {
    init_tracing();

    let temp_file = NamedTempFile::new().unwrap();
    // Keep the temp file alive - prevent deletion when function returns
    let db_path = temp_file
        .into_temp_path()
        .keep()
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();

    let registry = ConnectionRegistry::new();
    registry
        .set_dsn("app", &format!("sqlite://{}", db_path))
        .await
        .unwrap();
    let conn = registry.get("app").await.unwrap();

    let DbPool::Sqlite(pool) = conn.pool() else {
        panic!("expected a SQLite pool");
    };
    for statement in [
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            email VARCHAR(80) NOT NULL,
            name TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            bio TEXT DEFAULT 'new user'
        )",
        "CREATE UNIQUE INDEX idx_users_email ON users (email)",
        "CREATE INDEX idx_users_name ON users (name)",
        "CREATE VIEW active_users AS SELECT id, email FROM users WHERE active = 1",
    ] {
        sqlx::query(statement).execute(pool).await.unwrap();
    }

    (registry, conn)
}

#[tokio::test]
async fn test_list_tables_includes_views_and_is_ordered() {
    let (_registry, conn) = setup().await;

    let tables = conn.schema().list_tables().await.unwrap();
    assert_eq!(tables, vec!["active_users", "users"]);
}

#[tokio::test]
async fn test_list_tables_without_views_excludes_fixture_view() {
    let (_registry, conn) = setup().await;

    let tables = conn.schema().list_tables_without_views().await.unwrap();
    assert_eq!(tables, vec!["users"]);
}

#[tokio::test]
async fn test_describe_returns_columns_and_indexes() {
    let (_registry, conn) = setup().await;

    let description = conn.schema().describe("users").await.unwrap();
    assert_eq!(description.name, "users");
    assert_eq!(description.columns.len(), 5);

    // Columns come back in declaration order.
    let names: Vec<&str> = description
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["id", "email", "name", "active", "bio"]);

    let email = description.column("email").unwrap();
    assert!(!email.nullable);
    assert_eq!(email.length, Some(80));

    let name = description.column("name").unwrap();
    assert!(name.nullable);
    assert_eq!(name.length, None);

    // Defaults are typed by the declared column type.
    let active = description.column("active").unwrap();
    assert_eq!(active.default_value, Some(serde_json::json!(1)));

    let bio = description.column("bio").unwrap();
    assert_eq!(bio.default_value, Some(serde_json::json!("new user")));

    let email_idx = description.index("idx_users_email").unwrap();
    assert_eq!(email_idx.kind, IndexKind::Unique);
    assert_eq!(email_idx.columns, vec!["email"]);

    let name_idx = description.index("idx_users_name").unwrap();
    assert_eq!(name_idx.kind, IndexKind::Index);
}

#[tokio::test]
async fn test_describe_missing_table_fails() {
    let (_registry, conn) = setup().await;

    let result = conn.schema().describe("missing_table").await;
    assert!(matches!(result, Err(DbError::Schema { .. })));
}

#[tokio::test]
async fn test_describe_columns_facet() {
    let (_registry, conn) = setup().await;

    let columns = conn.schema().describe_columns("users").await.unwrap();
    assert_eq!(columns.len(), 5);

    let result = conn.schema().describe_columns("missing_table").await;
    assert!(matches!(result, Err(DbError::Schema { .. })));
}

#[tokio::test]
async fn test_describe_indexes_facet() {
    let (_registry, conn) = setup().await;

    let indexes = conn.schema().describe_indexes("users").await.unwrap();
    assert_eq!(indexes.len(), 2);

    // Indexes alone tolerate an unknown table; only describe() treats it
    // as an error.
    let indexes = conn.schema().describe_indexes("missing_table").await.unwrap();
    assert!(indexes.is_empty());
}

#[tokio::test]
async fn test_schema_reachable_through_registry_lookup() {
    let (registry, _conn) = setup().await;

    let conn = registry.get("default").await.unwrap();
    let tables = conn.schema().list_tables().await.unwrap();
    assert!(tables.contains(&"users".to_string()));
}
