//! Named connection registry.
//!
//! The registry is an explicit context object owning three maps: registered
//! configurations, cached connection instances, and aliases. Construct one
//! at application start, hand it around (it is cheaply cloneable), and tear
//! it down with [`close_all`](ConnectionRegistry::close_all).
//!
//! Construction on first access is single-flight: each entry carries a
//! shared `OnceCell`, so concurrent callers requesting the same
//! uninstantiated name end up with one connection instance.

use crate::connection::Connection;
use crate::driver::{DriverFactory, DriverRegistry};
use crate::dsn::DsnConfig;
use crate::error::{DbError, DbResult};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, info};

/// Name resolved for callers that do not ask for a connection by name.
pub const DEFAULT_NAME: &str = "default";

/// Callable that builds a connection on first access. Invoked with the
/// resolved configuration name.
pub type ConnectionFactory =
    Arc<dyn Fn(String) -> BoxFuture<'static, DbResult<Connection>> + Send + Sync>;

/// A registrable connection source: static configuration, a factory
/// invoked lazily, or an already-built connection.
pub enum ConnectionSource {
    Config(DsnConfig),
    Factory(ConnectionFactory),
    Prebuilt(Arc<Connection>),
}

impl ConnectionSource {
    /// Wrap an async closure as a factory source.
    pub fn factory<F, Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DbResult<Connection>> + Send + 'static,
    {
        Self::Factory(Arc::new(move |name| Box::pin(f(name))))
    }
}

impl From<DsnConfig> for ConnectionSource {
    fn from(config: DsnConfig) -> Self {
        Self::Config(config)
    }
}

impl From<Arc<Connection>> for ConnectionSource {
    fn from(conn: Arc<Connection>) -> Self {
        Self::Prebuilt(conn)
    }
}

impl std::fmt::Debug for ConnectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(config) => f.debug_tuple("Config").field(&config.masked()).finish(),
            Self::Factory(_) => f.write_str("Factory"),
            Self::Prebuilt(conn) => f.debug_tuple("Prebuilt").field(&conn.name()).finish(),
        }
    }
}

/// Read-only snapshot of what is registered under a name.
#[derive(Debug, Clone)]
pub enum RegisteredConfig {
    Config(DsnConfig),
    Factory,
    Prebuilt,
}

enum SourceSlot {
    Config {
        config: DsnConfig,
        builder: DriverFactory,
    },
    Factory(ConnectionFactory),
    Prebuilt,
}

struct RegistryEntry {
    slot: SourceSlot,
    cell: Arc<OnceCell<Arc<Connection>>>,
}

/// What `lookup` clones out of an entry so construction can run outside
/// the lock.
enum Init {
    Build {
        config: DsnConfig,
        builder: DriverFactory,
    },
    Factory(ConnectionFactory),
    Ready,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, RegistryEntry>,
    aliases: HashMap<String, String>,
    /// First successfully registered name; target of the implicit
    /// `default` alias.
    primary: Option<String>,
}

impl RegistryState {
    /// Resolve one alias hop. A bare `default` falls back to the primary
    /// when nothing is registered under that name explicitly.
    fn resolve(&self, name: &str) -> String {
        if let Some(target) = self.aliases.get(name) {
            return target.clone();
        }
        if name == DEFAULT_NAME && !self.entries.contains_key(DEFAULT_NAME) {
            if let Some(primary) = &self.primary {
                return primary.clone();
            }
        }
        name.to_string()
    }
}

/// Process-shareable store of named connection configurations and their
/// cached instances.
#[derive(Clone)]
pub struct ConnectionRegistry {
    drivers: DriverRegistry,
    state: Arc<RwLock<RegistryState>>,
}

impl ConnectionRegistry {
    /// Create a registry with the bundled drivers.
    pub fn new() -> Self {
        Self::with_drivers(DriverRegistry::with_defaults())
    }

    /// Create a registry with a custom driver table.
    pub fn with_drivers(drivers: DriverRegistry) -> Self {
        Self {
            drivers,
            state: Arc::new(RwLock::new(RegistryState::default())),
        }
    }

    /// The driver table this registry resolves against.
    pub fn drivers(&self) -> &DriverRegistry {
        &self.drivers
    }

    /// Register a connection source under a name.
    ///
    /// Fails with [`DbError::DuplicateConfig`] if the name is taken; drop
    /// the name first to replace it. Static configs resolve their driver
    /// here, so an unknown driver fails at registration rather than on
    /// first access.
    pub async fn set_config(
        &self,
        name: impl Into<String>,
        source: impl Into<ConnectionSource>,
    ) -> DbResult<()> {
        let name = name.into();
        validate_name(&name)?;

        let entry = match source.into() {
            ConnectionSource::Config(config) => {
                let builder = self.drivers.resolve(&config.driver)?;
                RegistryEntry {
                    slot: SourceSlot::Config { config, builder },
                    cell: Arc::new(OnceCell::new()),
                }
            }
            ConnectionSource::Factory(factory) => RegistryEntry {
                slot: SourceSlot::Factory(factory),
                cell: Arc::new(OnceCell::new()),
            },
            ConnectionSource::Prebuilt(conn) => RegistryEntry {
                slot: SourceSlot::Prebuilt,
                cell: Arc::new(OnceCell::new_with(Some(conn))),
            },
        };

        let mut state = self.state.write().await;
        if state.entries.contains_key(&name) {
            return Err(DbError::duplicate_config(&name));
        }
        if state.primary.is_none() {
            state.primary = Some(name.clone());
        }
        state.entries.insert(name.clone(), entry);
        info!(connection = %name, "registered connection configuration");
        Ok(())
    }

    /// Parse a DSN and register it in one step.
    pub async fn set_dsn(&self, name: impl Into<String>, dsn: &str) -> DbResult<()> {
        let config = DsnConfig::parse(dsn)?;
        self.set_config(name, config).await
    }

    /// Register several sources at once. Stops at the first failure.
    pub async fn set_configs<I, N>(&self, configs: I) -> DbResult<()>
    where
        I: IntoIterator<Item = (N, ConnectionSource)>,
        N: Into<String>,
    {
        for (name, source) in configs {
            self.set_config(name, source).await?;
        }
        Ok(())
    }

    /// Registered configuration names, sorted. Does not instantiate.
    pub async fn configured(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether a name has a registered configuration.
    pub async fn is_configured(&self, name: &str) -> bool {
        let state = self.state.read().await;
        state.entries.contains_key(name)
    }

    /// Snapshot of what is registered under a name. Does not instantiate.
    pub async fn get_config(&self, name: &str) -> Option<RegisteredConfig> {
        let state = self.state.read().await;
        state.entries.get(name).map(|entry| match &entry.slot {
            SourceSlot::Config { config, .. } => RegisteredConfig::Config(config.clone()),
            SourceSlot::Factory(_) => RegisteredConfig::Factory,
            SourceSlot::Prebuilt => RegisteredConfig::Prebuilt,
        })
    }

    /// Get the connection registered under `name`, resolving aliases and
    /// constructing the connection on first access.
    pub async fn get(&self, name: &str) -> DbResult<Arc<Connection>> {
        self.lookup(name, true).await
    }

    /// Get the connection registered directly under `name`, skipping alias
    /// resolution.
    pub async fn get_unaliased(&self, name: &str) -> DbResult<Arc<Connection>> {
        self.lookup(name, false).await
    }

    async fn lookup(&self, name: &str, use_aliases: bool) -> DbResult<Arc<Connection>> {
        let (resolved, cell, init) = {
            let state = self.state.read().await;
            let resolved = if use_aliases {
                state.resolve(name)
            } else {
                name.to_string()
            };
            let entry = state
                .entries
                .get(&resolved)
                .ok_or_else(|| DbError::not_found(&resolved))?;
            let init = match &entry.slot {
                SourceSlot::Config { config, builder } => Init::Build {
                    config: config.clone(),
                    builder: Arc::clone(builder),
                },
                SourceSlot::Factory(factory) => Init::Factory(Arc::clone(factory)),
                SourceSlot::Prebuilt => Init::Ready,
            };
            (resolved, Arc::clone(&entry.cell), init)
        }; // Read lock released here; construction must not hold it.

        if let Some(conn) = cell.get() {
            debug!(connection = %resolved, "returning cached connection");
            return Ok(Arc::clone(conn));
        }

        // Single-flight: concurrent callers share one construction. A
        // failure leaves the cell empty so the next call retries.
        let init_name = resolved.clone();
        let conn = cell
            .get_or_try_init(|| async move {
                match init {
                    Init::Build { config, builder } => {
                        Connection::build(init_name, config, builder).await.map(Arc::new)
                    }
                    Init::Factory(factory) => factory(init_name).await.map(Arc::new),
                    Init::Ready => Err(DbError::internal(format!(
                        "prebuilt connection '{}' missing from cache",
                        init_name
                    ))),
                }
            })
            .await?;
        Ok(Arc::clone(conn))
    }

    /// Register `alias` as an indirection to `source`. The source does not
    /// need to be registered or instantiated yet.
    pub async fn alias(&self, source: &str, alias: &str) -> DbResult<()> {
        if source == alias {
            return Err(DbError::invalid_input(format!(
                "alias '{}' cannot point to itself",
                alias
            )));
        }
        validate_name(alias)?;
        let mut state = self.state.write().await;
        state.aliases.insert(alias.to_string(), source.to_string());
        Ok(())
    }

    /// Remove an alias. Returns whether one was removed.
    pub async fn drop_alias(&self, alias: &str) -> bool {
        let mut state = self.state.write().await;
        state.aliases.remove(alias).is_some()
    }

    /// Remove a configuration, closing any cached instance. Returns
    /// whether something was removed.
    ///
    /// A lookup that raced the removal may still complete on the evicted
    /// entry's cell; the orphaned connection is valid until its holders
    /// drop it.
    pub async fn drop(&self, name: &str) -> bool {
        let removed = {
            let mut state = self.state.write().await;
            let removed = state.entries.remove(name);
            if removed.is_some() && state.primary.as_deref() == Some(name) {
                state.primary = None;
            }
            removed
        }; // Write lock released before closing the pool.

        match removed {
            Some(entry) => {
                if let Some(conn) = entry.cell.get() {
                    conn.close().await;
                    info!(connection = %name, "closed dropped connection");
                }
                true
            }
            None => false,
        }
    }

    /// The full alias map, including the implicit `default` entry when no
    /// explicit `default` configuration or alias exists.
    pub async fn aliases(&self) -> HashMap<String, String> {
        let state = self.state.read().await;
        let mut map = state.aliases.clone();
        if !map.contains_key(DEFAULT_NAME) && !state.entries.contains_key(DEFAULT_NAME) {
            if let Some(primary) = &state.primary {
                map.insert(DEFAULT_NAME.to_string(), primary.clone());
            }
        }
        map
    }

    /// Number of instantiated connections (not registered names).
    pub async fn connection_count(&self) -> usize {
        let state = self.state.read().await;
        state
            .entries
            .values()
            .filter(|entry| entry.cell.get().is_some())
            .count()
    }

    /// Drain every configuration and alias, closing cached instances.
    pub async fn close_all(&self) {
        let entries: Vec<(String, RegistryEntry)> = {
            let mut state = self.state.write().await;
            state.aliases.clear();
            state.primary = None;
            state.entries.drain().collect()
        }; // Lock released here

        for (name, entry) in entries {
            if let Some(conn) = entry.cell.get() {
                info!(connection = %name, "closing connection");
                conn.close().await;
            }
        }
        info!("all connections closed");
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("drivers", &self.drivers)
            .finish_non_exhaustive()
    }
}

fn validate_name(name: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::invalid_input("connection name cannot be empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DbError::invalid_input(format!(
            "connection name contains invalid characters: {}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registering_twice_fails() {
        let registry = ConnectionRegistry::new();
        registry
            .set_dsn("main", "sqlite::memory:")
            .await
            .unwrap();

        let result = registry.set_dsn("main", "sqlite::memory:").await;
        assert!(matches!(result, Err(DbError::DuplicateConfig { .. })));
    }

    #[tokio::test]
    async fn test_drop_allows_reregistration() {
        let registry = ConnectionRegistry::new();
        registry.set_dsn("main", "sqlite::memory:").await.unwrap();

        assert!(registry.drop("main").await);
        registry.set_dsn("main", "sqlite::memory:").await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_nonexistent_returns_false() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.drop("ghost").await);
        assert!(!registry.drop_alias("ghost").await);
    }

    #[tokio::test]
    async fn test_configured_is_sorted() {
        let registry = ConnectionRegistry::new();
        registry.set_dsn("replica", "sqlite::memory:").await.unwrap();
        registry.set_dsn("main", "sqlite::memory:").await.unwrap();

        assert_eq!(registry.configured().await, vec!["main", "replica"]);
        assert!(registry.is_configured("main").await);
        assert!(!registry.is_configured("ghost").await);
    }

    #[tokio::test]
    async fn test_get_config_does_not_instantiate() {
        let registry = ConnectionRegistry::new();
        registry.set_dsn("main", "sqlite::memory:").await.unwrap();

        match registry.get_config("main").await {
            Some(RegisteredConfig::Config(config)) => assert_eq!(config.driver, "sqlite"),
            other => panic!("unexpected snapshot: {:?}", other),
        }
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_get_unregistered_fails_not_found() {
        let registry = ConnectionRegistry::new();
        let result = registry.get("ghost").await;
        assert!(matches!(result, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_missing_driver_fails_at_registration() {
        let registry = ConnectionRegistry::new();
        let config = DsnConfig::parse("warehouse://localhost/db?driver=oracle").unwrap();

        let result = registry.set_config("wh", config).await;
        assert!(matches!(result, Err(DbError::MissingDriver { .. })));
        assert!(!registry.is_configured("wh").await);
    }

    #[tokio::test]
    async fn test_self_alias_rejected() {
        let registry = ConnectionRegistry::new();
        let result = registry.alias("main", "main").await;
        assert!(matches!(result, Err(DbError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_invalid_name_rejected() {
        let registry = ConnectionRegistry::new();
        let result = registry.set_dsn("bad name", "sqlite::memory:").await;
        assert!(matches!(result, Err(DbError::InvalidInput { .. })));

        let result = registry.set_dsn("", "sqlite::memory:").await;
        assert!(matches!(result, Err(DbError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn test_alias_bookkeeping() {
        let registry = ConnectionRegistry::new();
        registry.set_dsn("main", "sqlite::memory:").await.unwrap();
        registry.alias("main", "read").await.unwrap();

        let aliases = registry.aliases().await;
        assert_eq!(aliases.get("read"), Some(&"main".to_string()));

        assert!(registry.drop_alias("read").await);
        assert!(!registry.aliases().await.contains_key("read"));
    }

    #[tokio::test]
    async fn test_implicit_default_alias() {
        let registry = ConnectionRegistry::new();
        registry.set_dsn("main", "sqlite::memory:").await.unwrap();
        registry.set_dsn("replica", "sqlite::memory:").await.unwrap();

        let aliases = registry.aliases().await;
        assert_eq!(aliases.get(DEFAULT_NAME), Some(&"main".to_string()));
    }

    #[tokio::test]
    async fn test_explicit_default_suppresses_implicit_alias() {
        let registry = ConnectionRegistry::new();
        registry.set_dsn("default", "sqlite::memory:").await.unwrap();
        registry.set_dsn("other", "sqlite::memory:").await.unwrap();

        assert!(!registry.aliases().await.contains_key(DEFAULT_NAME));
    }

    #[tokio::test]
    async fn test_dropping_primary_clears_implicit_default() {
        let registry = ConnectionRegistry::new();
        registry.set_dsn("main", "sqlite::memory:").await.unwrap();
        assert!(registry.drop("main").await);

        assert!(!registry.aliases().await.contains_key(DEFAULT_NAME));
    }
}
