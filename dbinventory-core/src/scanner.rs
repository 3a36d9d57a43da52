//! One inventory pass over a database server.
//!
//! # Pass outline
//! 1. List databases. Failure here aborts the pass.
//! 2. Skip engine-bundled databases.
//! 3. For each remaining database, in listing order: fetch liveness, then
//!    table grants, then database-level grants. Catalogs that only describe
//!    the session's own database run in a session on that database.
//! 4. Hand every record to the sink as soon as it exists.
//!
//! Query and publish failures for one database or record are recorded as
//! [`ScanIssue`]s and the pass moves on. A database whose status query
//! fails is still reported, as `Unknown`. A lost connection or a missing
//! catalog entry aborts the pass with an error.

use crate::connector::CatalogConnection;
use crate::dialect::{self, DialectEntry, Operation, SessionScope};
use crate::models::{DatabaseRecord, InventoryRecord, LivenessState, PrivilegeRecord};
use crate::publisher::{self, EndpointKind, ReportSink};
use crate::system_databases::is_system_database;
use crate::{EngineConfig, InventoryError, Result};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Step of a pass an issue was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanStage {
    Listing,
    Status,
    TablePrivileges,
    DatabaseUserPrivileges,
    Publish,
}

impl std::fmt::Display for ScanStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Listing => "listing",
            Self::Status => "status",
            Self::TablePrivileges => "table privileges",
            Self::DatabaseUserPrivileges => "database user privileges",
            Self::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// A contained, non-fatal failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanIssue {
    /// Database being processed, if any
    pub database: Option<String>,
    pub stage: ScanStage,
    /// Rendered error message
    pub message: String,
}

impl ScanIssue {
    fn new(database: Option<&str>, stage: ScanStage, error: &InventoryError) -> Self {
        Self {
            database: database.map(str::to_string),
            stage,
            message: error.to_string(),
        }
    }
}

/// Outcome of a pass that ran to the end.
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Names returned by the listing query
    pub databases_listed: usize,
    pub system_databases_skipped: usize,
    /// Non-system databases the pass worked on
    pub databases_processed: usize,
    pub records_published: usize,
    pub status_queries: usize,
    pub privilege_queries: usize,
    pub issues: Vec<ScanIssue>,
}

impl ScanReport {
    fn new() -> Self {
        Self {
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            databases_listed: 0,
            system_databases_skipped: 0,
            databases_processed: 0,
            records_published: 0,
            status_queries: 0,
            privilege_queries: 0,
            issues: Vec::new(),
        }
    }

    /// Whether every query and publish succeeded.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Catalog entries a pass needs, resolved before any query runs.
struct PassPlan {
    listing: &'static DialectEntry,
    status: &'static DialectEntry,
    privileges: Vec<(&'static DialectEntry, ScanStage)>,
}

impl PassPlan {
    fn resolve(config: &EngineConfig) -> Result<Self> {
        let engine = config.engine_type();
        let scope = config.privilege_scope();
        let mut privileges = Vec::with_capacity(2);
        if scope.includes_table() {
            privileges.push((
                dialect::lookup(engine, Operation::TablePrivileges)?,
                ScanStage::TablePrivileges,
            ));
        }
        if scope.includes_database() {
            privileges.push((
                dialect::lookup(engine, Operation::DatabaseUserPrivileges)?,
                ScanStage::DatabaseUserPrivileges,
            ));
        }
        Ok(Self {
            listing: dialect::lookup(engine, Operation::ListDatabases)?,
            status: dialect::lookup(engine, Operation::DatabaseStatus)?,
            privileges,
        })
    }
}

/// Runs one full inventory pass.
///
/// # Errors
/// Returns an error, after publishing nothing further, when:
/// - the engine has no catalog entry for a needed operation
/// - the listing query fails
/// - the connection is lost while processing a database
pub async fn scan(
    connection: &dyn CatalogConnection,
    sink: &dyn ReportSink,
    config: &EngineConfig,
) -> Result<ScanReport> {
    let clock = Instant::now();
    let plan = PassPlan::resolve(config).inspect_err(|e| {
        error!(engine = %config.engine_type(), error = %e, "Pass aborted before listing");
    })?;
    let mut pass = Pass {
        connection,
        sink,
        config,
        plan: &plan,
        report: ScanReport::new(),
    };

    let names = pass.list_databases().await.inspect_err(|e| {
        error!(engine = %config.engine_type(), error = %e, "Pass aborted: cannot list databases");
    })?;

    for name in names {
        if is_system_database(&name, config.engine_type()) {
            debug!(database = %name, "Skipping system database");
            pass.report.system_databases_skipped += 1;
            continue;
        }
        pass.report.databases_processed += 1;
        pass.scan_database(&name).await.inspect_err(|e| {
            error!(database = %name, error = %e, "Pass aborted: connection lost");
        })?;
    }

    let mut report = pass.report;
    report.elapsed = clock.elapsed();
    info!(
        databases = report.databases_processed,
        skipped = report.system_databases_skipped,
        published = report.records_published,
        issues = report.issues.len(),
        elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        "Inventory pass complete"
    );
    Ok(report)
}

struct Pass<'a> {
    connection: &'a dyn CatalogConnection,
    sink: &'a dyn ReportSink,
    config: &'a EngineConfig,
    plan: &'a PassPlan,
    report: ScanReport,
}

impl Pass<'_> {
    async fn list_databases(&mut self) -> Result<Vec<String>> {
        let listing = self.plan.listing;
        let rows = self.connection.fetch_rows(listing.query, None).await?;
        self.report.databases_listed = rows.len();

        let mut names = Vec::with_capacity(rows.len());
        for row in &rows {
            match listing.database_name(row) {
                Ok(name) => names.push(name),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable database listing row");
                    self.report.issues.push(ScanIssue::new(None, ScanStage::Listing, &e));
                }
            }
        }
        debug!(count = names.len(), "Databases listed");
        Ok(names)
    }

    /// Processes one database. Only a connection error escapes.
    async fn scan_database(&mut self, database: &str) -> Result<()> {
        let plan = self.plan;
        self.sync_status(database).await?;
        for &(entry, stage) in &plan.privileges {
            self.sync_privileges(database, entry, stage).await?;
        }
        Ok(())
    }

    async fn sync_status(&mut self, database: &str) -> Result<()> {
        let entry = self.plan.status;
        self.report.status_queries += 1;
        let status = match self.query(entry, database).await {
            Ok(rows) => entry.liveness(&rows),
            Err(e) => Err(e),
        };

        let status = match status {
            Ok(status) => status,
            Err(e) if e.is_connection_error() => return Err(e),
            Err(e) => {
                warn!(database, error = %e, "Status query failed, reporting Unknown");
                self.report.issues.push(ScanIssue::new(Some(database), ScanStage::Status, &e));
                LivenessState::Unknown
            }
        };

        debug!(database, status = %status, "Database status");
        let record = DatabaseRecord::new(database, self.config.engine_type(), status);
        self.deliver(database, record.into(), EndpointKind::DbSync).await;
        Ok(())
    }

    async fn sync_privileges(
        &mut self,
        database: &str,
        entry: &'static DialectEntry,
        stage: ScanStage,
    ) -> Result<()> {
        self.report.privilege_queries += 1;
        let rows = match self.query(entry, database).await {
            Ok(rows) => rows,
            Err(e) if e.is_connection_error() => return Err(e),
            Err(e) => {
                warn!(database, stage = %stage, error = %e, "Privilege query failed");
                self.report.issues.push(ScanIssue::new(Some(database), stage, &e));
                return Ok(());
            }
        };

        debug!(database, stage = %stage, rows = rows.len(), "Privilege rows fetched");
        for row in &rows {
            let grant = match entry.grant(row) {
                Ok(grant) => grant,
                Err(e) => {
                    warn!(database, stage = %stage, error = %e, "Skipping unreadable privilege row");
                    self.report.issues.push(ScanIssue::new(Some(database), stage, &e));
                    continue;
                }
            };
            let record = PrivilegeRecord::new(
                database,
                grant.table_name,
                grant.user_name,
                grant.host,
                grant.privileges,
            );
            let endpoint = EndpointKind::for_privilege(&record);
            self.deliver(database, record.into(), endpoint).await;
        }
        Ok(())
    }

    async fn query(&self, entry: &DialectEntry, database: &str) -> Result<Vec<crate::CatalogRow>> {
        let bind = entry.binds_database.then_some(database);
        match entry.session {
            SessionScope::Server => self.connection.fetch_rows(entry.query, bind).await,
            SessionScope::Database => {
                self.connection
                    .fetch_rows_in(database, entry.query, bind)
                    .await
            }
        }
    }

    async fn deliver(&mut self, database: &str, record: InventoryRecord, endpoint: EndpointKind) {
        match publisher::publish(self.sink, &record, endpoint, self.config).await {
            Ok(()) => self.report.records_published += 1,
            Err(e) => self
                .report
                .issues
                .push(ScanIssue::new(Some(database), ScanStage::Publish, &e)),
        }
    }
}
