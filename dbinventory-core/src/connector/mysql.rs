//! MySQL connection pool.

use super::{CatalogConnection, map_sqlx_error, query_context};
use crate::config::PoolSettings;
use crate::dialect::CatalogRow;
use crate::error::redact_database_url;
use crate::models::EngineType;
use crate::Result;
use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Executor, Row};

pub(super) struct MySqlCatalog {
    pool: MySqlPool,
}

impl MySqlCatalog {
    /// Opens the pool and verifies one connection.
    pub(super) async fn connect(dsn: &str, settings: &PoolSettings) -> Result<Self> {
        let read_only = settings.read_only;
        let pool = MySqlPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.connect_timeout)
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if read_only {
                        conn.execute("SET SESSION TRANSACTION READ ONLY").await?;
                    }
                    conn.execute("SET time_zone = '+00:00'").await?;
                    Ok(())
                })
            })
            .connect(dsn)
            .await
            .map_err(|e| {
                crate::InventoryError::connection_failed(
                    format!("cannot connect to {}", redact_database_url(dsn)),
                    e,
                )
            })?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl CatalogConnection for MySqlCatalog {
    fn engine_type(&self) -> EngineType {
        EngineType::MySql
    }

    async fn fetch_rows(&self, query: &str, database: Option<&str>) -> Result<Vec<CatalogRow>> {
        let mut statement = sqlx::query(query);
        if let Some(database) = database {
            statement = statement.bind(database);
        }
        let rows = statement
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(&query_context(query), e))?;
        Ok(rows.iter().map(decode_row).collect())
    }

    // information_schema is server-wide on MySQL.
    async fn fetch_rows_in(
        &self,
        _database: &str,
        query: &str,
        bind: Option<&str>,
    ) -> Result<Vec<CatalogRow>> {
        self.fetch_rows(query, bind).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Decodes every column as text.
///
/// `SHOW` statements and `information_schema` columns may arrive with a
/// binary collation, which sqlx refuses to decode as `String`; those fall
/// back to lossy UTF-8 from the raw bytes.
fn decode_row(row: &MySqlRow) -> CatalogRow {
    let cells = (0..row.len())
        .map(|index| match row.try_get::<Option<String>, _>(index) {
            Ok(value) => value,
            Err(_) => row
                .try_get::<Option<Vec<u8>>, _>(index)
                .ok()
                .flatten()
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
        })
        .collect();
    CatalogRow::new(cells)
}
