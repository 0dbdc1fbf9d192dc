//! Live connections and the backend pool wrapper.

use crate::driver::{DriverFactory, DriverRegistry};
use crate::dsn::DsnConfig;
use crate::error::DbResult;
use crate::schema::SchemaDialect;
use sqlx::{MySqlPool, PgPool, SqlitePool};
use tracing::{debug, info, warn};

/// Backend-specific connection pool.
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

impl DbPool {
    /// Close the connection pool.
    pub async fn close(&self) {
        match self {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::MySql(pool) => pool.close().await,
            DbPool::Sqlite(pool) => pool.close().await,
        }
    }

    /// Get the driver identifier for this pool.
    pub fn driver_name(&self) -> &'static str {
        match self {
            DbPool::Postgres(_) => "postgres",
            DbPool::MySql(_) => "mysql",
            DbPool::Sqlite(_) => "sqlite",
        }
    }
}

/// A live, named backend session.
///
/// Connections are usually obtained from the
/// [`ConnectionRegistry`](crate::registry::ConnectionRegistry), which caches
/// one instance per resolved name. A connection can also be built directly
/// from a config, or wrapped around an existing pool for the prebuilt path.
#[derive(Debug, Clone)]
pub struct Connection {
    name: String,
    pool: DbPool,
    server_version: Option<String>,
}

impl Connection {
    /// Build a connection from a parsed config, resolving the driver
    /// through the given registry.
    pub async fn connect(
        name: impl Into<String>,
        config: DsnConfig,
        drivers: &DriverRegistry,
    ) -> DbResult<Self> {
        let builder = drivers.resolve(&config.driver)?;
        Self::build(name.into(), config, builder).await
    }

    /// Build a connection through an already-resolved driver factory.
    pub(crate) async fn build(
        name: String,
        config: DsnConfig,
        builder: DriverFactory,
    ) -> DbResult<Self> {
        debug!(connection = %name, dsn = %config.masked(), "connecting");
        let driver = config.driver.clone();
        let pool = builder(config).await?;
        let server_version = Self::fetch_server_version(&pool).await;
        info!(
            connection = %name,
            driver = %driver,
            server_version = ?server_version,
            "connected"
        );
        Ok(Self {
            name,
            pool,
            server_version,
        })
    }

    /// Wrap an existing pool.
    pub fn from_pool(name: impl Into<String>, pool: DbPool) -> Self {
        Self {
            name: name.into(),
            pool,
            server_version: None,
        }
    }

    /// The configuration name this connection was built for.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying pool.
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Server version reported at connect time, if the probe succeeded.
    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    /// The schema dialect bound to this connection's backend.
    pub fn schema(&self) -> SchemaDialect {
        SchemaDialect::new(self.pool.clone())
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Probe the server version from the connected backend.
    async fn fetch_server_version(pool: &DbPool) -> Option<String> {
        let query = match pool {
            DbPool::Postgres(_) | DbPool::MySql(_) => "SELECT version()",
            DbPool::Sqlite(_) => "SELECT sqlite_version()",
        };

        let result = match pool {
            DbPool::Postgres(p) => sqlx::query_scalar::<_, String>(query).fetch_one(p).await,
            DbPool::MySql(p) => sqlx::query_scalar::<_, String>(query).fetch_one(p).await,
            DbPool::Sqlite(p) => sqlx::query_scalar::<_, String>(query).fetch_one(p).await,
        };

        match result {
            Ok(version) => {
                debug!(version = %version, "got server version");
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "failed to get server version");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_driver_name() {
        // Lazy pools never touch the network, so they are safe to build here.
        let pool = DbPool::Postgres(PgPool::connect_lazy("postgres://localhost/db").unwrap());
        assert_eq!(pool.driver_name(), "postgres");
    }

    #[tokio::test]
    async fn test_from_pool_has_no_version() {
        let pool = DbPool::MySql(MySqlPool::connect_lazy("mysql://localhost/db").unwrap());
        let conn = Connection::from_pool("replica", pool);
        assert_eq!(conn.name(), "replica");
        assert!(conn.server_version().is_none());
    }
}
