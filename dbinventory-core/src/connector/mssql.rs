//! SQL Server connection over a single tiberius client.
//!
//! tiberius has no pool; one client is held in a [`SessionSlot`], which
//! matches the one-query-at-a-time pass. A client that fails at the
//! transport level is discarded and the next query logs in again, so a
//! dropped connection costs at most the pass it happened in.

use super::query_context;
use super::slot::SessionSlot;
use super::CatalogConnection;
use crate::dialect::CatalogRow;
use crate::models::EngineType;
use crate::{EngineConfig, InventoryError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tiberius::{AuthMethod, Client, Config, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type TdsClient = Client<Compat<TcpStream>>;

pub(super) struct SqlServerCatalog {
    slot: SessionSlot<TdsClient>,
    tds: Config,
    connect_timeout: Duration,
}

impl SqlServerCatalog {
    pub(super) async fn connect(config: &EngineConfig) -> Result<Self> {
        let credentials = config.credentials();
        let mut tds = Config::new();
        tds.host(config.host());
        tds.port(config.port());
        tds.authentication(AuthMethod::sql_server(
            credentials.username(),
            credentials.password(),
        ));
        tds.application_name("dbinventory");
        if let Some(database) = config.database() {
            tds.database(database);
        }
        // Agents commonly reach servers with self-signed certificates.
        tds.trust_cert();

        let connect_timeout = config.pool().connect_timeout;
        let client = login(tds.clone(), connect_timeout).await?;
        Ok(Self {
            slot: SessionSlot::new(client),
            tds,
            connect_timeout,
        })
    }

    async fn run(&self, database: Option<&str>, query: &str, bind: Option<&str>) -> Result<Vec<CatalogRow>> {
        let mut guard = self
            .slot
            .acquire(|| login(self.tds.clone(), self.connect_timeout))
            .await?;
        let Some(client) = guard.as_mut() else {
            return Err(super::slot::closed_error());
        };

        let result = query_on(client, database, query, bind).await;
        if let Err(e) = &result
            && e.is_connection_error()
        {
            tracing::warn!(error = %e, "SQL Server connection lost, reconnecting on next query");
            guard.take();
        }
        result
    }
}

async fn login(tds: Config, connect_timeout: Duration) -> Result<TdsClient> {
    let target = tds.get_addr().to_string();

    let tcp = tokio::time::timeout(connect_timeout, TcpStream::connect(tds.get_addr()))
        .await
        .map_err(|e| InventoryError::connection_failed(format!("timed out connecting to {target}"), e))?
        .map_err(|e| InventoryError::connection_failed(format!("cannot reach {target}"), e))?;
    tcp.set_nodelay(true)
        .map_err(|e| InventoryError::connection_failed(format!("cannot configure socket to {target}"), e))?;

    Client::connect(tds, tcp.compat_write())
        .await
        .map_err(|e| InventoryError::connection_failed(format!("login to {target} failed"), e))
}

async fn query_on(
    client: &mut TdsClient,
    database: Option<&str>,
    query: &str,
    bind: Option<&str>,
) -> Result<Vec<CatalogRow>> {
    if let Some(database) = database {
        let switch = format!("USE {}", quote_identifier(database));
        client
            .execute(switch.as_str(), &[])
            .await
            .map_err(|e| map_tds_error(&switch, e))?;
    }

    let stream = match bind {
        Some(value) => client.query(query, &[&value]).await,
        None => client.query(query, &[]).await,
    }
    .map_err(|e| map_tds_error(query, e))?;
    let rows = stream
        .into_first_result()
        .await
        .map_err(|e| map_tds_error(query, e))?;

    rows.iter().map(|row| decode_row(row, query)).collect()
}

/// Brackets an identifier, doubling any closing bracket inside it.
fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

#[async_trait]
impl CatalogConnection for SqlServerCatalog {
    fn engine_type(&self) -> EngineType {
        EngineType::SqlServer
    }

    async fn fetch_rows(&self, query: &str, database: Option<&str>) -> Result<Vec<CatalogRow>> {
        self.run(None, query, database).await
    }

    async fn fetch_rows_in(
        &self,
        database: &str,
        query: &str,
        bind: Option<&str>,
    ) -> Result<Vec<CatalogRow>> {
        self.run(Some(database), query, bind).await
    }

    async fn close(&self) {
        if let Some(client) = self.slot.close().await
            && let Err(e) = client.close().await
        {
            tracing::debug!(error = %e, "SQL Server connection did not close cleanly");
        }
    }
}

/// Transport and protocol failures leave the client unusable; server
/// errors only fail the statement.
fn map_tds_error(query: &str, error: tiberius::error::Error) -> InventoryError {
    use tiberius::error::Error;
    match error {
        Error::Io { .. } | Error::Protocol(_) | Error::Tls(_) | Error::Routing { .. } => {
            InventoryError::connection_failed(query_context(query), error)
        }
        other => InventoryError::query_failed(query_context(query), other),
    }
}

fn decode_row(row: &Row, query: &str) -> Result<CatalogRow> {
    let cells = (0..row.len())
        .map(|index| {
            row.try_get::<&str, _>(index)
                .map(|cell| cell.map(str::to_string))
                .map_err(|e| InventoryError::query_failed(query_context(query), e))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CatalogRow::new(cells))
}
