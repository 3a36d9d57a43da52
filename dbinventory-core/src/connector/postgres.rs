//! PostgreSQL connection pool.
//!
//! Server-wide catalogs run on the pool, which stays attached to the
//! configured database. Per-database catalogs get a short-lived connection
//! to the target database, set up the same way as pooled sessions.

use super::{CatalogConnection, map_sqlx_error, query_context};
use crate::config::PoolSettings;
use crate::dialect::CatalogRow;
use crate::error::redact_database_url;
use crate::models::EngineType;
use crate::{InventoryError, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgExecutor, PgPool, PgPoolOptions, PgRow};
use sqlx::{Connection, Executor, Row};
use std::str::FromStr;

pub(super) struct PostgresCatalog {
    pool: PgPool,
    options: PgConnectOptions,
    settings: PoolSettings,
}

impl PostgresCatalog {
    /// Opens the pool and verifies one connection.
    pub(super) async fn connect(dsn: &str, settings: &PoolSettings) -> Result<Self> {
        let context = || format!("cannot connect to {}", redact_database_url(dsn));
        let options =
            PgConnectOptions::from_str(dsn).map_err(|e| InventoryError::connection_failed(context(), e))?;

        let read_only = settings.read_only;
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.connect_timeout)
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| Box::pin(prepare_session(conn, read_only)))
            .connect_with(options.clone())
            .await
            .map_err(|e| InventoryError::connection_failed(context(), e))?;

        Ok(Self {
            pool,
            options,
            settings: settings.clone(),
        })
    }

    /// Opens a read-only session on `database`.
    async fn attach(&self, database: &str) -> Result<PgConnection> {
        let context = || format!("cannot open a session on database '{database}'");
        let options = self.options.clone().database(database);

        let mut conn = tokio::time::timeout(
            self.settings.connect_timeout,
            PgConnection::connect_with(&options),
        )
        .await
        .map_err(|e| InventoryError::query_failed(context(), e))?
        .map_err(|e| InventoryError::query_failed(context(), e))?;

        prepare_session(&mut conn, self.settings.read_only)
            .await
            .map_err(|e| InventoryError::query_failed(context(), e))?;
        Ok(conn)
    }
}

async fn prepare_session(conn: &mut PgConnection, read_only: bool) -> sqlx::Result<()> {
    conn.execute("SET application_name = 'dbinventory'").await?;
    if read_only {
        conn.execute("SET default_transaction_read_only = on").await?;
    }
    conn.execute("SET timezone = 'UTC'").await?;
    Ok(())
}

async fn fetch<'e, E>(executor: E, query: &'e str, bind: Option<&'e str>) -> sqlx::Result<Vec<PgRow>>
where
    E: PgExecutor<'e>,
{
    let mut statement = sqlx::query(query);
    if let Some(value) = bind {
        statement = statement.bind(value);
    }
    statement.fetch_all(executor).await
}

#[async_trait]
impl CatalogConnection for PostgresCatalog {
    fn engine_type(&self) -> EngineType {
        EngineType::Postgres
    }

    async fn fetch_rows(&self, query: &str, database: Option<&str>) -> Result<Vec<CatalogRow>> {
        let rows = fetch(&self.pool, query, database)
            .await
            .map_err(|e| map_sqlx_error(&query_context(query), e))?;
        rows.iter().map(|row| decode_row(row, query)).collect()
    }

    async fn fetch_rows_in(
        &self,
        database: &str,
        query: &str,
        bind: Option<&str>,
    ) -> Result<Vec<CatalogRow>> {
        let mut conn = self.attach(database).await?;
        let rows = fetch(&mut conn, query, bind)
            .await
            .map_err(|e| InventoryError::query_failed(query_context(query), e));
        if let Err(e) = conn.close().await {
            tracing::debug!(database, error = %e, "Database session did not close cleanly");
        }
        rows?.iter().map(|row| decode_row(row, query)).collect()
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Decodes every column as text; catalog queries cast to `text`.
fn decode_row(row: &PgRow, query: &str) -> Result<CatalogRow> {
    let cells = (0..row.len())
        .map(|index| {
            row.try_get::<Option<String>, _>(index)
                .map_err(|e| InventoryError::query_failed(query_context(query), e))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CatalogRow::new(cells))
}
