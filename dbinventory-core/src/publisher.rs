//! Report delivery to the collector service.
//!
//! Each record is wrapped in a [`ReportEnvelope`] whose JSON keys match the
//! collector endpoint it goes to, then POSTed once. A failed delivery is
//! reported as [`InventoryError::Publish`] and never retried; the caller
//! decides whether to carry on.

use crate::models::{DatabaseRecord, EngineType, InventoryRecord, LivenessState, PrivilegeRecord, Role};
use crate::{EngineConfig, InventoryError, Result};
use async_trait::async_trait;
use serde::Serialize;

/// Longest response body excerpt kept for logs and errors.
const BODY_LOG_LIMIT: usize = 512;

/// Collector endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// Database discovery and liveness
    DbSync,
    /// Database-level user privileges
    DbUser,
    /// Table-level privileges
    DbPrivilege,
}

impl EndpointKind {
    /// Every endpoint, in declaration order.
    pub const ALL: [Self; 3] = [Self::DbSync, Self::DbUser, Self::DbPrivilege];

    const fn index(self) -> usize {
        match self {
            Self::DbSync => 0,
            Self::DbUser => 1,
            Self::DbPrivilege => 2,
        }
    }

    /// Path appended to the collector base URL.
    pub const fn path(self) -> &'static str {
        match self {
            Self::DbSync => "/api/v1/databaseService/dbSync",
            Self::DbUser => "/api/v1/databaseService/dbUser",
            Self::DbPrivilege => "/api/v1/databaseService/dbPrivilege",
        }
    }

    /// Endpoint a privilege record belongs to.
    pub fn for_privilege(record: &PrivilegeRecord) -> Self {
        if record.is_table_level() {
            Self::DbPrivilege
        } else {
            Self::DbUser
        }
    }
}

impl std::fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::DbSync => "dbSync",
            Self::DbUser => "dbUser",
            Self::DbPrivilege => "dbPrivilege",
        };
        f.write_str(name)
    }
}

/// Body of a `dbSync` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSyncPayload {
    pub org_id: i64,
    pub tenant_id: i64,
    pub database_type: EngineType,
    pub database_name: String,
    pub port: u16,
    pub host: String,
    pub status: LivenessState,
    pub uuid: String,
}

/// Body of a `dbUser` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbUserPayload {
    pub org_id: i64,
    pub tenant_id: i64,
    pub database_type: EngineType,
    pub database_name: String,
    pub user_name: String,
    pub host: String,
    pub role: Role,
    pub privilege: String,
}

/// Body of a `dbPrivilege` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbPrivilegePayload {
    pub org_id: i64,
    pub tenant_id: i64,
    pub database_type: EngineType,
    pub database_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    pub user_name: String,
    pub host: String,
    pub privilege_type: String,
}

/// One JSON report, shaped for exactly one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReportEnvelope {
    DbSync(DbSyncPayload),
    DbUser(DbUserPayload),
    DbPrivilege(DbPrivilegePayload),
}

impl ReportEnvelope {
    /// Endpoint this report must be sent to.
    pub const fn endpoint(&self) -> EndpointKind {
        match self {
            Self::DbSync(_) => EndpointKind::DbSync,
            Self::DbUser(_) => EndpointKind::DbUser,
            Self::DbPrivilege(_) => EndpointKind::DbPrivilege,
        }
    }

    /// Merges a record with the configured identifiers for an endpoint.
    ///
    /// # Errors
    /// Returns a configuration error when the record kind does not belong to
    /// the endpoint (for example a privilege record sent to `dbSync`)
    pub fn build(record: &InventoryRecord, endpoint: EndpointKind, config: &EngineConfig) -> Result<Self> {
        match (record, endpoint) {
            (InventoryRecord::Database(database), EndpointKind::DbSync) => {
                Ok(Self::database(database, config))
            }
            (InventoryRecord::Privilege(privilege), EndpointKind::DbUser) => {
                Ok(Self::user(privilege, config))
            }
            (InventoryRecord::Privilege(privilege), EndpointKind::DbPrivilege) => {
                Ok(Self::privilege(privilege, config))
            }
            (_, endpoint) => Err(InventoryError::configuration(format!(
                "record cannot be reported to {endpoint}"
            ))),
        }
    }

    /// `dbSync` report for a discovered database.
    pub fn database(record: &DatabaseRecord, config: &EngineConfig) -> Self {
        Self::DbSync(DbSyncPayload {
            org_id: config.org_id(),
            tenant_id: config.tenant_id(),
            database_type: record.engine_type(),
            database_name: record.name().to_string(),
            port: config.port(),
            host: config.host().to_string(),
            status: record.status(),
            uuid: config.agent_id().to_string(),
        })
    }

    /// `dbUser` report for database-level grants.
    pub fn user(record: &PrivilegeRecord, config: &EngineConfig) -> Self {
        Self::DbUser(DbUserPayload {
            org_id: config.org_id(),
            tenant_id: config.tenant_id(),
            database_type: config.engine_type(),
            database_name: record.database_name().to_string(),
            user_name: record.user_name().to_string(),
            host: record.host().to_string(),
            role: record.role(),
            privilege: record.privilege_list(),
        })
    }

    /// `dbPrivilege` report; carries `tableName` for table-level grants.
    pub fn privilege(record: &PrivilegeRecord, config: &EngineConfig) -> Self {
        Self::DbPrivilege(DbPrivilegePayload {
            org_id: config.org_id(),
            tenant_id: config.tenant_id(),
            database_type: config.engine_type(),
            database_name: record.database_name().to_string(),
            table_name: record.table_name().map(str::to_string),
            user_name: record.user_name().to_string(),
            host: record.host().to_string(),
            privilege_type: record.privilege_list(),
        })
    }
}

/// Destination for reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Delivers one report.
    ///
    /// # Errors
    /// Returns [`InventoryError::Publish`] when the report was not accepted
    async fn publish(&self, envelope: &ReportEnvelope) -> Result<()>;
}

/// Sink that POSTs reports as JSON to the collector.
#[derive(Debug, Clone)]
pub struct HttpPublisher {
    client: reqwest::Client,
    /// Resolved endpoint URLs, in `EndpointKind::ALL` order
    urls: [String; 3],
}

impl HttpPublisher {
    /// Creates a publisher for the configured collector.
    ///
    /// The configured HTTP timeout applies to the whole request.
    ///
    /// # Errors
    /// Returns a configuration error if the HTTP client cannot be built
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("dbinventory-agent/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.http_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| InventoryError::configuration(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            urls: EndpointKind::ALL.map(|endpoint| config.endpoint_url(endpoint)),
        })
    }

    /// URL reports for `endpoint` are posted to.
    pub fn url(&self, endpoint: EndpointKind) -> &str {
        &self.urls[endpoint.index()]
    }
}

#[async_trait]
impl ReportSink for HttpPublisher {
    async fn publish(&self, envelope: &ReportEnvelope) -> Result<()> {
        let endpoint = envelope.endpoint();
        let response = self
            .client
            .post(self.url(endpoint))
            .json(envelope)
            .send()
            .await
            .map_err(|e| InventoryError::publish_failed(endpoint.to_string(), None, transport_reason(&e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            InventoryError::publish_failed(
                endpoint.to_string(),
                Some(status.as_u16()),
                format!("cannot read response body: {e}"),
            )
        })?;
        let excerpt = truncate_body(&body, BODY_LOG_LIMIT);

        if !status.is_success() {
            return Err(InventoryError::publish_failed(
                endpoint.to_string(),
                Some(status.as_u16()),
                format!("collector answered {status}: {excerpt}"),
            ));
        }

        tracing::debug!(
            endpoint = %endpoint,
            status = status.as_u16(),
            body = %excerpt,
            "Collector accepted report"
        );
        Ok(())
    }
}

fn transport_reason(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        format!("cannot reach collector: {error}")
    } else {
        format!("transport error: {error}")
    }
}

/// Cuts a body to at most `limit` bytes on a character boundary.
fn truncate_body(body: &str, limit: usize) -> &str {
    if body.len() <= limit {
        return body;
    }
    let end = (0..=limit)
        .rev()
        .find(|&index| body.is_char_boundary(index))
        .unwrap_or(0);
    &body[..end]
}

/// Builds the report for `record` and hands it to `sink`.
///
/// Failures are logged with the endpoint and returned; the record is not
/// retried.
///
/// # Errors
/// Returns the sink's [`InventoryError::Publish`], or a configuration error
/// when the record does not belong to `endpoint`
pub async fn publish(
    sink: &dyn ReportSink,
    record: &InventoryRecord,
    endpoint: EndpointKind,
    config: &EngineConfig,
) -> Result<()> {
    let envelope = ReportEnvelope::build(record, endpoint, config)?;
    if let Err(error) = sink.publish(&envelope).await {
        tracing::warn!(endpoint = %endpoint, error = %error, "Report dropped");
        return Err(error);
    }
    Ok(())
}
