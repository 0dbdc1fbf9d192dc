//! Schema introspection.
//!
//! [`SchemaDialect`] turns backend metadata into the normalized shapes in
//! [`crate::models`]. SQL text, quoting, and type differences are confined
//! to the per-backend submodules; queries live in the `queries` submodule
//! as constants.

use crate::connection::DbPool;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnDescription, IndexDescription, IndexKind, TableDescription};
use tracing::debug;

/// Backend-specific introspection behind a normalized interface.
#[derive(Debug, Clone)]
pub struct SchemaDialect {
    pool: DbPool,
}

impl SchemaDialect {
    /// Create a dialect for a pool. Usually reached through
    /// [`Connection::schema`](crate::connection::Connection::schema).
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Ordered names of base tables and views.
    pub async fn list_tables(&self) -> DbResult<Vec<String>> {
        self.list(true).await
    }

    /// Ordered names of base tables only.
    pub async fn list_tables_without_views(&self) -> DbResult<Vec<String>> {
        self.list(false).await
    }

    async fn list(&self, include_views: bool) -> DbResult<Vec<String>> {
        match &self.pool {
            DbPool::Postgres(p) => postgres::list_tables(p, include_views).await,
            DbPool::MySql(p) => mysql::list_tables(p, include_views).await,
            DbPool::Sqlite(p) => sqlite::list_tables(p, include_views).await,
        }
    }

    /// Full description of one table: columns plus indexes.
    ///
    /// Fails with a schema error when the table does not exist; never
    /// returns an empty success.
    pub async fn describe(&self, table: &str) -> DbResult<TableDescription> {
        let columns = self.describe_columns(table).await?;
        let indexes = self.describe_indexes(table).await?;
        Ok(TableDescription {
            name: table.to_string(),
            columns,
            indexes,
        })
    }

    /// Column descriptions for one table, in ordinal order.
    ///
    /// A table cannot have zero columns, so an empty result means the
    /// table does not exist and fails with a schema error.
    pub async fn describe_columns(&self, table: &str) -> DbResult<Vec<ColumnDescription>> {
        let columns = match &self.pool {
            DbPool::Postgres(p) => postgres::describe_columns(p, table).await?,
            DbPool::MySql(p) => mysql::describe_columns(p, table).await?,
            DbPool::Sqlite(p) => sqlite::describe_columns(p, table).await?,
        };
        if columns.is_empty() {
            return Err(DbError::schema(
                format!("Table '{}' not found", table),
                table.to_string(),
            ));
        }
        Ok(columns)
    }

    /// Index descriptions for one table. A table with no indexes (or an
    /// unknown table) yields an empty list.
    pub async fn describe_indexes(&self, table: &str) -> DbResult<Vec<IndexDescription>> {
        match &self.pool {
            DbPool::Postgres(p) => postgres::describe_indexes(p, table).await,
            DbPool::MySql(p) => mysql::describe_indexes(p, table).await,
            DbPool::Sqlite(p) => sqlite::describe_indexes(p, table).await,
        }
    }
}

// =============================================================================
// SQL Query Templates
// =============================================================================
//
// Centralized SQL for introspection. Each backend has its own submodule with
// queries adapted to its system catalogs.

mod queries {
    pub mod postgres {
        pub const LIST_TABLES_WITH_VIEWS: &str = r#"
            SELECT table_name FROM information_schema.tables
            WHERE table_schema = current_schema()
            AND table_type IN ('BASE TABLE', 'VIEW')
            ORDER BY table_name
            "#;

        pub const LIST_TABLES_NO_VIEWS: &str = r#"
            SELECT table_name FROM information_schema.tables
            WHERE table_schema = current_schema()
            AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            c.column_name,
            format_type(a.atttypid, a.atttypmod) as column_type,
            c.character_maximum_length,
            c.is_nullable,
            c.column_default,
            col_description(t.oid, a.attnum) as column_comment
        FROM information_schema.columns c
        JOIN pg_class t ON t.relname = c.table_name
        JOIN pg_namespace n ON n.oid = t.relnamespace AND n.nspname = c.table_schema
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attname = c.column_name
        WHERE c.table_name = $1 AND c.table_schema = current_schema()
        ORDER BY c.ordinal_position
        "#;

        pub const DESCRIBE_INDEXES: &str = r#"
        SELECT
            i.relname as index_name,
            array_agg(a.attname ORDER BY array_position(ix.indkey, a.attnum)) as column_names,
            ix.indisunique as is_unique,
            ix.indisprimary as is_primary
        FROM pg_index ix
        JOIN pg_class i ON i.oid = ix.indexrelid
        JOIN pg_class t ON t.oid = ix.indrelid
        JOIN pg_namespace n ON n.oid = t.relnamespace
        JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
        WHERE t.relname = $1 AND n.nspname = current_schema()
        GROUP BY i.relname, ix.indisunique, ix.indisprimary
        "#;
    }

    pub mod mysql {
        pub const LIST_TABLES_WITH_VIEWS: &str = r#"
            SELECT CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE()
            AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
            ORDER BY TABLE_NAME
            "#;

        pub const LIST_TABLES_NO_VIEWS: &str = r#"
            SELECT CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE()
            AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#;

        pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME,
            CONVERT(COLUMN_TYPE USING utf8) AS COLUMN_TYPE,
            CHARACTER_MAXIMUM_LENGTH,
            CONVERT(IS_NULLABLE USING utf8) AS IS_NULLABLE,
            CONVERT(COLUMN_DEFAULT USING utf8) AS COLUMN_DEFAULT,
            CONVERT(COLUMN_COMMENT USING utf8) AS COLUMN_COMMENT
        FROM information_schema.COLUMNS
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE()
        ORDER BY ORDINAL_POSITION
        "#;

        pub const DESCRIBE_INDEXES: &str = r#"
        SELECT
            CONVERT(INDEX_NAME USING utf8) AS INDEX_NAME,
            CONVERT(GROUP_CONCAT(COLUMN_NAME ORDER BY SEQ_IN_INDEX) USING utf8) as COLUMN_NAMES,
            CONVERT(GROUP_CONCAT(COALESCE(SUB_PART, 0) ORDER BY SEQ_IN_INDEX) USING utf8) as COLUMN_LENGTHS,
            NOT NON_UNIQUE as IS_UNIQUE,
            CONVERT(INDEX_TYPE USING utf8) AS INDEX_TYPE
        FROM information_schema.STATISTICS
        WHERE TABLE_NAME = ? AND TABLE_SCHEMA = DATABASE()
        GROUP BY INDEX_NAME, NON_UNIQUE, INDEX_TYPE
        "#;
    }

    pub mod sqlite {
        pub const LIST_TABLES_WITH_VIEWS: &str = r#"
            SELECT name FROM sqlite_master
            WHERE type IN ('table', 'view')
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;

        pub const LIST_TABLES_NO_VIEWS: &str = r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table'
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;
    }
}

// =============================================================================
// Backend-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    pub async fn list_tables(pool: &PgPool, include_views: bool) -> DbResult<Vec<String>> {
        let query = if include_views {
            queries::postgres::LIST_TABLES_WITH_VIEWS
        } else {
            queries::postgres::LIST_TABLES_NO_VIEWS
        };

        let rows = sqlx::query(query).fetch_all(pool).await?;
        let tables: Vec<String> = rows.iter().map(|row| row.get("table_name")).collect();

        debug!(count = tables.len(), "listed PostgreSQL tables");
        Ok(tables)
    }

    pub async fn describe_columns(
        pool: &PgPool,
        table: &str,
    ) -> DbResult<Vec<ColumnDescription>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_COLUMNS)
            .bind(table)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("column_name");
                let column_type: String = row.get("column_type");
                let length: Option<i32> = row.try_get("character_maximum_length").ok().flatten();
                let nullable: String = row.get("is_nullable");
                let default_value: Option<String> = row.try_get("column_default").ok().flatten();
                let comment: Option<String> = row.try_get("column_comment").ok().flatten();

                let mut col = ColumnDescription::new(&name, &column_type, nullable == "YES");
                if let Some(len) = length.and_then(|l| u32::try_from(l).ok()) {
                    col = col.with_length(len);
                }
                if let Some(ref def) = default_value {
                    col = col.with_default_str(def);
                }
                if let Some(ref c) = comment {
                    if !c.is_empty() {
                        col = col.with_comment(c);
                    }
                }
                col
            })
            .collect())
    }

    pub async fn describe_indexes(
        pool: &PgPool,
        table: &str,
    ) -> DbResult<Vec<IndexDescription>> {
        let rows = sqlx::query(queries::postgres::DESCRIBE_INDEXES)
            .bind(table)
            .fetch_all(pool)
            .await
            .unwrap_or_default();

        Ok(rows
            .iter()
            .filter_map(|row| {
                let name: String = row.get("index_name");
                let columns: Vec<String> = row.get("column_names");
                let is_unique: bool = row.get("is_unique");
                let is_primary: bool = row.get("is_primary");

                if columns.is_empty() {
                    return None;
                }

                let kind = if is_primary {
                    IndexKind::Primary
                } else if is_unique {
                    IndexKind::Unique
                } else {
                    IndexKind::Index
                };
                Some(IndexDescription::new(name, columns).with_kind(kind))
            })
            .collect())
    }
}

mod mysql {
    use super::*;
    use sqlx::{MySqlPool, Row};

    /// Safely get a string from a MySQL row.
    /// MySQL may return VARBINARY instead of VARCHAR depending on charset
    /// configuration.
    fn get_string(row: &sqlx::mysql::MySqlRow, column: &str) -> String {
        row.try_get::<String, _>(column)
            .ok()
            .or_else(|| {
                row.try_get::<Vec<u8>, _>(column)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
            .unwrap_or_default()
    }

    /// Safely get an optional string from a MySQL row.
    fn get_optional_string(row: &sqlx::mysql::MySqlRow, column: &str) -> Option<String> {
        row.try_get::<Option<String>, _>(column)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<Vec<u8>>, _>(column)
                    .ok()
                    .flatten()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
            })
    }

    pub async fn list_tables(pool: &MySqlPool, include_views: bool) -> DbResult<Vec<String>> {
        let query = if include_views {
            queries::mysql::LIST_TABLES_WITH_VIEWS
        } else {
            queries::mysql::LIST_TABLES_NO_VIEWS
        };

        let rows = sqlx::query(query).fetch_all(pool).await?;
        let tables: Vec<String> = rows
            .iter()
            .map(|row| get_string(row, "TABLE_NAME"))
            .filter(|name| !name.is_empty())
            .collect();

        debug!(count = tables.len(), "listed MySQL tables");
        Ok(tables)
    }

    pub async fn describe_columns(
        pool: &MySqlPool,
        table: &str,
    ) -> DbResult<Vec<ColumnDescription>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_COLUMNS)
            .bind(table)
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name = get_string(row, "COLUMN_NAME");
                let column_type = get_string(row, "COLUMN_TYPE");
                let length: Option<i64> = row
                    .try_get("CHARACTER_MAXIMUM_LENGTH")
                    .ok()
                    .flatten();
                let nullable = get_string(row, "IS_NULLABLE");
                let default_value = get_optional_string(row, "COLUMN_DEFAULT");
                let comment = get_optional_string(row, "COLUMN_COMMENT");

                let mut col = ColumnDescription::new(&name, &column_type, nullable == "YES");
                if let Some(len) = length.and_then(|l| u32::try_from(l).ok()) {
                    col = col.with_length(len);
                }
                if let Some(ref def) = default_value {
                    col = col.with_default_str(def);
                }
                if let Some(ref c) = comment {
                    if !c.is_empty() {
                        col = col.with_comment(c);
                    }
                }
                col
            })
            .collect())
    }

    pub async fn describe_indexes(
        pool: &MySqlPool,
        table: &str,
    ) -> DbResult<Vec<IndexDescription>> {
        let rows = sqlx::query(queries::mysql::DESCRIBE_INDEXES)
            .bind(table)
            .fetch_all(pool)
            .await
            .unwrap_or_default();

        Ok(rows
            .iter()
            .map(|row| {
                let name = get_string(row, "INDEX_NAME");
                let columns_str = get_string(row, "COLUMN_NAMES");
                let lengths_str = get_string(row, "COLUMN_LENGTHS");
                let is_unique: i64 = row.try_get("IS_UNIQUE").unwrap_or(0);
                let index_type = get_string(row, "INDEX_TYPE");

                let columns: Vec<String> = columns_str.split(',').map(String::from).collect();
                let is_primary = name == "PRIMARY";

                let kind = if is_primary {
                    IndexKind::Primary
                } else if index_type.eq_ignore_ascii_case("FULLTEXT") {
                    IndexKind::Fulltext
                } else if is_unique != 0 {
                    IndexKind::Unique
                } else {
                    IndexKind::Index
                };

                let mut idx = IndexDescription::new(name, columns.clone()).with_kind(kind);
                for (column, length) in columns.iter().zip(lengths_str.split(',')) {
                    if let Ok(len) = length.parse::<u32>() {
                        if len > 0 {
                            idx = idx.with_length(column, len);
                        }
                    }
                }
                idx
            })
            .collect())
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    pub async fn list_tables(pool: &SqlitePool, include_views: bool) -> DbResult<Vec<String>> {
        let query = if include_views {
            queries::sqlite::LIST_TABLES_WITH_VIEWS
        } else {
            queries::sqlite::LIST_TABLES_NO_VIEWS
        };

        let rows = sqlx::query(query).fetch_all(pool).await?;
        let tables: Vec<String> = rows.iter().map(|row| row.get("name")).collect();

        debug!(count = tables.len(), "listed SQLite tables");
        Ok(tables)
    }

    pub async fn describe_columns(
        pool: &SqlitePool,
        table: &str,
    ) -> DbResult<Vec<ColumnDescription>> {
        let pragma_query = format!("PRAGMA table_info('{}')", table);
        let rows = sqlx::query(&pragma_query).fetch_all(pool).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                let data_type: String = row.get("type");
                let notnull: i32 = row.get("notnull");
                let default_value: Option<String> = row.try_get("dflt_value").ok().flatten();

                let mut col = ColumnDescription::new(&name, &data_type, notnull == 0);
                if let Some(len) = parse_declared_length(&data_type) {
                    col = col.with_length(len);
                }
                if let Some(ref def) = default_value {
                    col = col.with_default_str(trim_quotes(def));
                }
                // SQLite has no column comments.
                col
            })
            .collect())
    }

    pub async fn describe_indexes(
        pool: &SqlitePool,
        table: &str,
    ) -> DbResult<Vec<IndexDescription>> {
        let idx_query = format!("PRAGMA index_list('{}')", table);
        let idx_list = sqlx::query(&idx_query)
            .fetch_all(pool)
            .await
            .unwrap_or_default();

        let mut indexes = Vec::new();
        for idx_row in &idx_list {
            let name: String = idx_row.get("name");
            let is_unique: i32 = idx_row.get("unique");
            let origin: String = idx_row.try_get("origin").unwrap_or_default();

            let columns = index_columns(pool, &name).await;
            if columns.is_empty() {
                continue;
            }

            let kind = if origin == "pk" {
                IndexKind::Primary
            } else if is_unique != 0 {
                IndexKind::Unique
            } else {
                IndexKind::Index
            };
            indexes.push(IndexDescription::new(name, columns).with_kind(kind));
        }
        Ok(indexes)
    }

    async fn index_columns(pool: &SqlitePool, index_name: &str) -> Vec<String> {
        let query = format!("PRAGMA index_info('{}')", index_name);
        sqlx::query(&query)
            .fetch_all(pool)
            .await
            .unwrap_or_default()
            .iter()
            .map(|row| row.get("name"))
            .collect()
    }

    /// Parse a declared character length out of a type like `VARCHAR(40)`.
    pub(super) fn parse_declared_length(declared: &str) -> Option<u32> {
        let open = declared.find('(')?;
        let close = declared[open..].find(')')? + open;
        declared[open + 1..close]
            .split(',')
            .next()?
            .trim()
            .parse()
            .ok()
    }

    /// Strip the quoting SQLite keeps around string literal defaults.
    pub(super) fn trim_quotes(value: &str) -> &str {
        value
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
            .unwrap_or(value)
    }
}
