//! Shared fixtures: a scripted catalog connection and a recording sink.

#![allow(dead_code)]

use async_trait::async_trait;
use dbinventory_core::dialect::{CatalogRow, Operation, SessionScope, lookup, query_for};
use dbinventory_core::publisher::{EndpointKind, ReportEnvelope, ReportSink};
use dbinventory_core::{
    CatalogConnection, Credentials, EngineConfig, EngineType, InventoryError, PrivilegeScope,
    Result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const MYSQL_SYSTEM: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];

/// Configuration with fixed identifiers and a one-minute interval.
pub fn config(engine: EngineType) -> EngineConfig {
    config_with_scope(engine, PrivilegeScope::Both)
}

pub fn config_with_scope(engine: EngineType, scope: PrivilegeScope) -> EngineConfig {
    EngineConfig::builder(engine)
        .host("db01.internal")
        .credentials(Credentials::new("inventory".into(), "s3cret".into()))
        .org_id(42)
        .tenant_id(7)
        .sync_interval_minutes(1)
        .collector_url("http://collector.invalid")
        .privilege_scope(scope)
        .agent_id(uuid::Uuid::nil())
        .build()
        .expect("valid test configuration")
}

pub fn rows<const N: usize>(cells: &[[&str; N]]) -> Vec<CatalogRow> {
    cells.iter().map(|row| CatalogRow::from_texts(*row)).collect()
}

pub fn names(names: &[&str]) -> Vec<CatalogRow> {
    names.iter().map(|name| CatalogRow::from_texts([*name])).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Query,
    Connection,
}

impl Failure {
    fn to_error(self, operation: Operation) -> InventoryError {
        let cause = std::io::Error::other(format!("scripted {operation} failure"));
        match self {
            Self::Query => InventoryError::query_failed(operation.to_string(), cause),
            Self::Connection => InventoryError::connection_failed(operation.to_string(), cause),
        }
    }
}

type Key = (Operation, Option<String>);

#[derive(Default)]
struct Script {
    responses: HashMap<Key, Vec<CatalogRow>>,
    failures: HashMap<Key, Failure>,
    listing_failures: AtomicUsize,
    delay: Option<Duration>,
    calls: Mutex<Vec<Key>>,
    sessions: Mutex<Vec<(Operation, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    closed: AtomicBool,
}

/// In-memory connection answering catalog queries from a script.
///
/// Queries are recognized by their catalog text and keyed by the bound
/// database name, or by the session database for `fetch_rows_in`.
/// Unscripted queries return no rows. Like a real server, a catalog scoped
/// to the session's database returns nothing when read through the server
/// session. Clones share state, so a test can keep one clone after handing
/// another to the code under test.
#[derive(Clone)]
pub struct ScriptedConnection {
    engine: EngineType,
    script: Arc<Script>,
}

impl ScriptedConnection {
    pub fn new(engine: EngineType) -> Self {
        Self {
            engine,
            script: Arc::new(Script::default()),
        }
    }

    fn script_mut(&mut self) -> &mut Script {
        Arc::get_mut(&mut self.script).expect("script is configured before cloning")
    }

    pub fn with_rows(mut self, operation: Operation, database: Option<&str>, rows: Vec<CatalogRow>) -> Self {
        self.script_mut()
            .responses
            .insert((operation, database.map(str::to_string)), rows);
        self
    }

    pub fn failing(mut self, operation: Operation, database: Option<&str>, failure: Failure) -> Self {
        self.script_mut()
            .failures
            .insert((operation, database.map(str::to_string)), failure);
        self
    }

    /// The listing query drops the connection this many times, then recovers.
    pub fn fail_listing_times(mut self, times: usize) -> Self {
        self.script_mut().listing_failures = AtomicUsize::new(times);
        self
    }

    /// Every query takes this long.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.script_mut().delay = Some(delay);
        self
    }

    /// MySQL server with the four system schemas and one `appdb`.
    pub fn mysql_appdb() -> Self {
        let mut listing: Vec<&str> = MYSQL_SYSTEM.to_vec();
        listing.push("appdb");
        Self::new(EngineType::MySql)
            .with_rows(Operation::ListDatabases, None, names(&listing))
            .with_rows(Operation::DatabaseStatus, None, rows(&[["Uptime", "8812"]]))
            .with_rows(
                Operation::TablePrivileges,
                Some("appdb"),
                rows(&[["appdb", "orders", "'bob'@'localhost'", "SELECT"]]),
            )
            .with_rows(
                Operation::DatabaseUserPrivileges,
                Some("appdb"),
                rows(&[
                    ["'bob'@'localhost'", "SELECT"],
                    ["'alice'@'localhost'", "SUPER,SELECT"],
                ]),
            )
    }

    /// PostgreSQL server with the given user databases plus its system ones.
    ///
    /// Each database reports Active, one table grant and one user grant.
    pub fn postgres_with(databases: &[&str]) -> Self {
        let mut listing = vec!["postgres", "template0", "template1"];
        listing.extend_from_slice(databases);
        let mut connection =
            Self::new(EngineType::Postgres).with_rows(Operation::ListDatabases, None, names(&listing));
        for &database in databases {
            let table = format!("public.{database}_events");
            connection = connection
                .with_rows(Operation::DatabaseStatus, Some(database), rows(&[["true", "false"]]))
                .with_rows(
                    Operation::TablePrivileges,
                    Some(database),
                    rows(&[[database, table.as_str(), "app_rw", "10.0.0.5", "SELECT,INSERT"]]),
                )
                .with_rows(
                    Operation::DatabaseUserPrivileges,
                    Some(database),
                    rows(&[["app_rw", "10.0.0.5", "CONNECT,TEMPORARY"]]),
                );
        }
        connection
    }

    pub fn calls(&self) -> Vec<(Operation, Option<String>)> {
        self.script.calls.lock().expect("call log").clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.calls().iter().filter(|(op, _)| *op == operation).count()
    }

    /// Queries run in a session attached to a database, in call order.
    pub fn sessions(&self) -> Vec<(Operation, String)> {
        self.script.sessions.lock().expect("session log").clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.script.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.script.closed.load(Ordering::SeqCst)
    }

    fn operation_for(&self, query: &str) -> Operation {
        Operation::ALL
            .into_iter()
            .find(|op| query_for(self.engine, *op).is_ok_and(|q| q == query))
            .expect("query comes from the dialect catalog")
    }

    async fn serve(
        &self,
        operation: Operation,
        database: Option<&str>,
        visible: bool,
    ) -> Result<Vec<CatalogRow>> {
        self.script
            .calls
            .lock()
            .expect("call log")
            .push((operation, database.map(str::to_string)));

        let now = self.script.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.script.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }
        let result = self
            .answer(operation, database)
            .map(|rows| if visible { rows } else { Vec::new() });
        self.script.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn answer(&self, operation: Operation, database: Option<&str>) -> Result<Vec<CatalogRow>> {
        let script = &self.script;
        if script.closed.load(Ordering::SeqCst) {
            return Err(Failure::Connection.to_error(operation));
        }
        if operation == Operation::ListDatabases
            && script
                .listing_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(Failure::Connection.to_error(operation));
        }
        let key = (operation, database.map(str::to_string));
        if let Some(failure) = script.failures.get(&key) {
            return Err(failure.to_error(operation));
        }
        Ok(script.responses.get(&key).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl CatalogConnection for ScriptedConnection {
    fn engine_type(&self) -> EngineType {
        self.engine
    }

    async fn fetch_rows(&self, query: &str, database: Option<&str>) -> Result<Vec<CatalogRow>> {
        let operation = self.operation_for(query);
        let visible = lookup(self.engine, operation)
            .is_ok_and(|entry| entry.session == SessionScope::Server);
        self.serve(operation, database, visible).await
    }

    async fn fetch_rows_in(
        &self,
        database: &str,
        query: &str,
        _bind: Option<&str>,
    ) -> Result<Vec<CatalogRow>> {
        let operation = self.operation_for(query);
        self.script
            .sessions
            .lock()
            .expect("session log")
            .push((operation, database.to_string()));
        self.serve(operation, Some(database), true).await
    }

    async fn close(&self) {
        self.script.closed.store(true, Ordering::SeqCst);
    }
}

type FailWhen = Box<dyn Fn(&ReportEnvelope) -> bool + Send + Sync>;

/// Sink that keeps every accepted report in memory.
#[derive(Default)]
pub struct RecordingSink {
    accepted: Mutex<Vec<ReportEnvelope>>,
    attempts: AtomicUsize,
    fail_when: Option<FailWhen>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects reports matching `predicate` as a 503 from the collector.
    pub fn failing_when(predicate: impl Fn(&ReportEnvelope) -> bool + Send + Sync + 'static) -> Self {
        Self {
            fail_when: Some(Box::new(predicate)),
            ..Self::default()
        }
    }

    pub fn accepted(&self) -> Vec<ReportEnvelope> {
        self.accepted.lock().expect("accepted reports").clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn to(&self, endpoint: EndpointKind) -> Vec<ReportEnvelope> {
        self.accepted()
            .into_iter()
            .filter(|envelope| envelope.endpoint() == endpoint)
            .collect()
    }

    pub fn clear(&self) {
        self.accepted.lock().expect("accepted reports").clear();
    }
}

#[async_trait]
impl ReportSink for RecordingSink {
    async fn publish(&self, envelope: &ReportEnvelope) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_when.as_ref().is_some_and(|fail| fail(envelope)) {
            return Err(InventoryError::publish_failed(
                envelope.endpoint().to_string(),
                Some(503),
                "collector unavailable",
            ));
        }
        self.accepted.lock().expect("accepted reports").push(envelope.clone());
        Ok(())
    }
}

/// Database name carried by any report.
pub fn database_of(envelope: &ReportEnvelope) -> &str {
    match envelope {
        ReportEnvelope::DbSync(payload) => &payload.database_name,
        ReportEnvelope::DbUser(payload) => &payload.database_name,
        ReportEnvelope::DbPrivilege(payload) => &payload.database_name,
    }
}
