//! Catalog introspection and inventory synchronization engine for DBInventory.
//!
//! This crate holds everything the agent needs to inventory a relational
//! database instance and forward the result to a collector service:
//! - a dialect catalog of per-engine introspection queries and row adapters
//! - a connector that opens a pooled, read-only connection to the engine
//! - a static filter for engine-bundled system databases
//! - the inventory scanner that runs one synchronization pass
//! - the report publisher that POSTs normalized records as JSON
//! - the scheduler that drives passes on a fixed interval
//!
//! # Security Guarantees
//! - Database credentials are zeroized on drop and never logged
//! - Connection strings are redacted in every error and log line
//! - All catalog queries are read-only
//!
//! # Architecture
//! Engine knowledge is confined to [`dialect`]. The scanner talks to the
//! database through the object-safe [`CatalogConnection`] trait and to the
//! collector through the object-safe [`ReportSink`] trait, so a pass can run
//! against any driver or transport.

pub mod config;
pub mod connector;
pub mod credentials;
pub mod dialect;
pub mod error;
pub mod logging;
pub mod models;
pub mod publisher;
pub mod scanner;
pub mod scheduler;
pub mod system_databases;

// Re-export commonly used types
pub use config::{EngineConfig, EngineConfigBuilder, PoolSettings};
pub use connector::{CatalogConnection, build_dsn, connect};
pub use credentials::Credentials;
pub use dialect::{CatalogRow, Operation, SessionScope, query_for, result_shape};
pub use error::{InventoryError, Result};
pub use logging::{LogFormat, LogOptions, init_logging};
pub use models::{
    DatabaseRecord, EngineType, InventoryRecord, LivenessState, PrivilegeRecord, PrivilegeScope,
    Role,
};
pub use publisher::{EndpointKind, HttpPublisher, ReportEnvelope, ReportSink, publish};
pub use scanner::{ScanIssue, ScanReport, ScanStage, scan};
pub use scheduler::{AgentHandle, AgentState, RunSummary, Scheduler};
pub use system_databases::is_system_database;
