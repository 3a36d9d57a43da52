//! Immutable agent configuration.
//!
//! An [`EngineConfig`] is built once at startup through
//! [`EngineConfigBuilder`] and then only read. The scheduler and scanner
//! borrow it; nothing re-assigns it while the agent runs.

use crate::models::{EngineType, PrivilegeScope};
use crate::{Credentials, EndpointKind, InventoryError, Result};
use std::time::Duration;
use uuid::Uuid;

/// Connection pool limits and timeouts for the database connection.
///
/// # Security
/// This struct intentionally does NOT store credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Connection timeout duration
    pub connect_timeout: Duration,
    /// Maximum number of connections in pool
    pub max_connections: u32,
    /// Whether to put sessions in read-only mode
    pub read_only: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            // A single worker runs one query at a time
            max_connections: 2,
            read_only: true,
        }
    }
}

impl PoolSettings {
    /// Validates pool parameters.
    ///
    /// # Errors
    /// Returns error if values are zero or exceed safe limits
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(InventoryError::configuration(
                "max_connections must be greater than 0",
            ));
        }

        if self.max_connections > 100 {
            return Err(InventoryError::configuration(
                "max_connections should not exceed 100 for safety",
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(InventoryError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Everything one agent instance needs to inventory a database server.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    engine_type: EngineType,
    host: String,
    port: u16,
    database: Option<String>,
    credentials: Credentials,
    org_id: i64,
    tenant_id: i64,
    sync_interval: Duration,
    collector_url: String,
    privilege_scope: PrivilegeScope,
    agent_id: Uuid,
    http_timeout: Option<Duration>,
    pool: PoolSettings,
}

impl EngineConfig {
    /// Starts a builder for the given engine.
    pub fn builder(engine_type: EngineType) -> EngineConfigBuilder {
        EngineConfigBuilder::new(engine_type)
    }

    /// Engine dialect of the target server.
    pub fn engine_type(&self) -> EngineType {
        self.engine_type
    }

    /// Database server host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Database server port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Database the connection logs into, if the engine needs one.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    /// Login used for the connection.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Organization identifier stamped on every report.
    pub fn org_id(&self) -> i64 {
        self.org_id
    }

    /// Tenant identifier stamped on every report.
    pub fn tenant_id(&self) -> i64 {
        self.tenant_id
    }

    /// Time between synchronization passes.
    pub fn sync_interval(&self) -> Duration {
        self.sync_interval
    }

    /// Collector base URL without a trailing slash.
    pub fn collector_url(&self) -> &str {
        &self.collector_url
    }

    /// Full URL of a collector endpoint.
    pub fn endpoint_url(&self, endpoint: EndpointKind) -> String {
        format!("{}{}", self.collector_url, endpoint.path())
    }

    /// Which privilege queries run during a pass.
    pub fn privilege_scope(&self) -> PrivilegeScope {
        self.privilege_scope
    }

    /// Identifier of this agent instance, reported with every database.
    pub fn agent_id(&self) -> Uuid {
        self.agent_id
    }

    /// Per-request timeout applied by the HTTP client.
    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout
    }

    /// Connection pool settings.
    pub fn pool(&self) -> &PoolSettings {
        &self.pool
    }
}

/// Validating builder for [`EngineConfig`].
///
/// # Example
/// ```rust
/// use dbinventory_core::{Credentials, EngineConfig, EngineType};
///
/// let config = EngineConfig::builder(EngineType::MySql)
///     .host("db01.internal")
///     .credentials(Credentials::new("inventory".into(), "secret".into()))
///     .org_id(7)
///     .tenant_id(3)
///     .sync_interval_minutes(5)
///     .collector_url("https://collector.example.com/")
///     .build()
///     .unwrap();
///
/// assert_eq!(config.port(), 3306);
/// assert_eq!(config.collector_url(), "https://collector.example.com");
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfigBuilder {
    engine_type: EngineType,
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    credentials: Option<Credentials>,
    org_id: Option<i64>,
    tenant_id: Option<i64>,
    sync_interval: Option<Duration>,
    collector_url: Option<String>,
    privilege_scope: PrivilegeScope,
    agent_id: Option<Uuid>,
    http_timeout: Option<Duration>,
    pool: PoolSettings,
}

impl EngineConfigBuilder {
    /// Creates a builder with defaults for the engine.
    pub fn new(engine_type: EngineType) -> Self {
        Self {
            engine_type,
            host: None,
            port: None,
            database: None,
            credentials: None,
            org_id: None,
            tenant_id: None,
            sync_interval: None,
            collector_url: None,
            privilege_scope: PrivilegeScope::default(),
            agent_id: None,
            http_timeout: Some(Duration::from_secs(30)),
            pool: PoolSettings::default(),
        }
    }

    /// Sets the database host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the port (engine default when not set).
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the login database (engine default when not set).
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Sets the login credentials.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the organization identifier.
    pub fn org_id(mut self, org_id: i64) -> Self {
        self.org_id = Some(org_id);
        self
    }

    /// Sets the tenant identifier.
    pub fn tenant_id(mut self, tenant_id: i64) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Sets the pass interval.
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Sets the pass interval in minutes.
    pub fn sync_interval_minutes(self, minutes: u64) -> Self {
        self.sync_interval(Duration::from_secs(minutes.saturating_mul(60)))
    }

    /// Sets the collector base URL.
    pub fn collector_url(mut self, url: impl Into<String>) -> Self {
        self.collector_url = Some(url.into());
        self
    }

    /// Sets which privilege queries run.
    pub fn privilege_scope(mut self, scope: PrivilegeScope) -> Self {
        self.privilege_scope = scope;
        self
    }

    /// Sets the agent instance identifier (random when not set).
    pub fn agent_id(mut self, agent_id: Uuid) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    /// Sets or clears the HTTP request timeout.
    pub fn http_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Sets connection pool settings.
    pub fn pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    /// Validates the settings and freezes them into an [`EngineConfig`].
    ///
    /// # Errors
    /// Returns a configuration error naming the first missing or invalid value
    pub fn build(self) -> Result<EngineConfig> {
        let host = required(self.host, "host")?;
        if host.trim().is_empty() {
            return Err(InventoryError::configuration("host cannot be empty"));
        }

        let port = self.port.unwrap_or_else(|| self.engine_type.default_port());
        if port == 0 {
            return Err(InventoryError::configuration(
                "port must be greater than 0",
            ));
        }

        let credentials = required(self.credentials, "credentials")?;
        if credentials.username().is_empty() {
            return Err(InventoryError::configuration("username cannot be empty"));
        }

        let sync_interval = required(self.sync_interval, "sync interval")?;
        if sync_interval.is_zero() {
            return Err(InventoryError::configuration(
                "sync interval must be greater than 0",
            ));
        }

        let collector_url = normalize_collector_url(&required(self.collector_url, "collector URL")?)?;

        if self.http_timeout.is_some_and(|t| t.is_zero()) {
            return Err(InventoryError::configuration(
                "HTTP timeout must be greater than 0",
            ));
        }

        self.pool.validate()?;

        let database = self
            .database
            .filter(|db| !db.trim().is_empty())
            .or_else(|| self.engine_type.default_database().map(str::to_string));

        Ok(EngineConfig {
            engine_type: self.engine_type,
            host: host.trim().to_string(),
            port,
            database,
            credentials,
            org_id: required(self.org_id, "organization id")?,
            tenant_id: required(self.tenant_id, "tenant id")?,
            sync_interval,
            collector_url,
            privilege_scope: self.privilege_scope,
            agent_id: self.agent_id.unwrap_or_else(Uuid::new_v4),
            http_timeout: self.http_timeout,
            pool: self.pool,
        })
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| InventoryError::configuration(format!("{name} is required")))
}

/// Checks the collector URL is absolute http(s) and strips trailing slashes.
fn normalize_collector_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = url::Url::parse(trimmed).map_err(|e| {
        InventoryError::configuration(format!("invalid collector URL '{trimmed}': {e}"))
    })?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(InventoryError::configuration(format!(
            "collector URL must use http or https, got '{}'",
            parsed.scheme()
        )));
    }

    Ok(trimmed.to_string())
}
