//! Per-engine introspection queries and result adapters.
//!
//! All engine knowledge lives in one static table keyed by
//! ([`EngineType`], [`Operation`]). Each entry carries the query text, the
//! ordered column list the query returns, whether the query binds the
//! database name, the session it must run in, and the adapter that turns
//! rows into inventory values.
//! Supporting another engine means adding its rows here; the scanner and
//! connector do not change.
//!
//! # Module Structure
//! - `mysql`, `postgres`, `mssql`, `oracle`: the catalog rows per engine
//!
//! # Row contract
//! Every query projects text columns only (casting or aggregating where the
//! engine would return another type), so drivers hand rows over as
//! [`CatalogRow`] cells and adapters never deal with driver types.

mod mssql;
mod mysql;
mod oracle;
mod postgres;

use crate::models::{EngineType, LivenessState};
use crate::{InventoryError, Result};
use std::collections::BTreeSet;

/// Catalog operations an engine must provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Names of all databases on the server
    ListDatabases,
    /// Liveness of one database
    DatabaseStatus,
    /// Grants per (table, user) within one database
    TablePrivileges,
    /// Grants per user at database scope
    DatabaseUserPrivileges,
}

impl Operation {
    /// All operations, in the order a pass uses them.
    pub const ALL: [Self; 4] = [
        Self::ListDatabases,
        Self::DatabaseStatus,
        Self::TablePrivileges,
        Self::DatabaseUserPrivileges,
    ];
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ListDatabases => "ListDatabases",
            Self::DatabaseStatus => "DatabaseStatus",
            Self::TablePrivileges => "TablePrivileges",
            Self::DatabaseUserPrivileges => "DatabaseUserPrivileges",
        };
        f.write_str(name)
    }
}

/// One result row as ordered text cells; `None` is SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    cells: Vec<Option<String>>,
}

impl CatalogRow {
    /// Creates a row from decoded cells.
    pub fn new(cells: Vec<Option<String>>) -> Self {
        Self { cells }
    }

    /// Creates a row of non-NULL cells.
    pub fn from_texts<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(cells.into_iter().map(|c| Some(c.into())).collect())
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the row has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell value, `None` for NULL or out of range.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.cells.get(index).and_then(|c| c.as_deref())
    }

    /// Required cell value.
    ///
    /// # Errors
    /// Returns a query error when the cell is NULL or missing
    pub fn text(&self, index: usize, field: &str) -> Result<&str> {
        self.get(index).ok_or_else(|| {
            InventoryError::row_shape(
                format!("column '{field}'"),
                format!("expected a value at position {index}, found NULL"),
            )
        })
    }
}

/// Grant facts extracted from one privilege row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantRow {
    pub table_name: Option<String>,
    pub user_name: String,
    pub host: String,
    pub privileges: BTreeSet<String>,
}

/// Converts rows of one operation into inventory values.
#[derive(Debug, Clone, Copy)]
pub enum RowAdapter {
    /// Extracts a database name from a listing row
    DatabaseName(fn(&CatalogRow) -> Result<String>),
    /// Maps the whole status result set to a liveness state
    Liveness(fn(&[CatalogRow]) -> LivenessState),
    /// Extracts grant facts from a privilege row
    Grant(fn(&CatalogRow) -> Result<GrantRow>),
}

/// Which session a catalog query must run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionScope {
    /// Any session on the server sees the rows
    Server,
    /// The catalog only describes the database the session is attached to
    Database,
}

/// One row of the dialect catalog.
#[derive(Debug, Clone, Copy)]
pub struct DialectEntry {
    pub engine: EngineType,
    pub operation: Operation,
    pub query: &'static str,
    pub shape: &'static [&'static str],
    pub binds_database: bool,
    pub session: SessionScope,
    pub adapter: RowAdapter,
}

impl DialectEntry {
    /// Checks that a row has exactly the declared number of columns.
    ///
    /// # Errors
    /// Returns a query error describing the mismatch
    pub fn check_shape(&self, row: &CatalogRow) -> Result<()> {
        if row.len() == self.shape.len() {
            return Ok(());
        }
        Err(InventoryError::row_shape(
            format!("{} {}", self.engine, self.operation),
            format!(
                "expected {} columns ({}), got {}",
                self.shape.len(),
                self.shape.join(", "),
                row.len()
            ),
        ))
    }

    /// Extracts a database name from a listing row.
    ///
    /// # Errors
    /// Returns an error for a malformed row or a non-listing entry
    pub fn database_name(&self, row: &CatalogRow) -> Result<String> {
        self.check_shape(row)?;
        match self.adapter {
            RowAdapter::DatabaseName(adapt) => adapt(row),
            _ => Err(self.adapter_mismatch("database name")),
        }
    }

    /// Maps a status result set to a liveness state.
    ///
    /// # Errors
    /// Returns an error for malformed rows or a non-status entry
    pub fn liveness(&self, rows: &[CatalogRow]) -> Result<LivenessState> {
        for row in rows {
            self.check_shape(row)?;
        }
        match self.adapter {
            RowAdapter::Liveness(adapt) => Ok(adapt(rows)),
            _ => Err(self.adapter_mismatch("liveness")),
        }
    }

    /// Extracts grant facts from a privilege row.
    ///
    /// # Errors
    /// Returns an error for a malformed row or a non-privilege entry
    pub fn grant(&self, row: &CatalogRow) -> Result<GrantRow> {
        self.check_shape(row)?;
        match self.adapter {
            RowAdapter::Grant(adapt) => adapt(row),
            _ => Err(self.adapter_mismatch("grant")),
        }
    }

    fn adapter_mismatch(&self, wanted: &str) -> InventoryError {
        InventoryError::configuration(format!(
            "{} {} entry has no {wanted} adapter",
            self.engine, self.operation
        ))
    }
}

fn catalog() -> impl Iterator<Item = &'static DialectEntry> {
    mysql::ENTRIES
        .iter()
        .chain(postgres::ENTRIES)
        .chain(mssql::ENTRIES)
        .chain(oracle::ENTRIES)
}

/// Finds the catalog entry for an engine and operation.
///
/// # Errors
/// Returns [`InventoryError::UnsupportedEngine`] when no entry exists
pub fn lookup(engine: EngineType, operation: Operation) -> Result<&'static DialectEntry> {
    catalog()
        .find(|entry| entry.engine == engine && entry.operation == operation)
        .ok_or_else(|| InventoryError::unsupported_engine(engine.as_str(), operation.to_string()))
}

/// Query text for an engine and operation.
///
/// # Errors
/// Returns [`InventoryError::UnsupportedEngine`] when no entry exists
pub fn query_for(engine: EngineType, operation: Operation) -> Result<&'static str> {
    lookup(engine, operation).map(|entry| entry.query)
}

/// Ordered column list an engine's query returns for an operation.
///
/// # Errors
/// Returns [`InventoryError::UnsupportedEngine`] when no entry exists
pub fn result_shape(engine: EngineType, operation: Operation) -> Result<&'static [&'static str]> {
    lookup(engine, operation).map(|entry| entry.shape)
}

/// Splits a comma-joined privilege list into a normalized set.
///
/// Names are trimmed and upper-cased; empty items are dropped.
pub fn split_privileges(joined: &str) -> BTreeSet<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_ascii_uppercase)
        .collect()
}

/// Extracts the single database name column of a listing row.
fn first_column_name(row: &CatalogRow) -> Result<String> {
    row.text(0, "database_name").map(str::to_string)
}

/// Builds a table-level grant from the canonical
/// `database_name, table_name, user_name, host, privilege_names` shape.
fn table_grant(row: &CatalogRow) -> Result<GrantRow> {
    Ok(GrantRow {
        table_name: Some(row.text(1, "table_name")?.to_string()),
        user_name: row.text(2, "user_name")?.to_string(),
        host: row.get(3).unwrap_or_default().to_string(),
        privileges: split_privileges(row.get(4).unwrap_or_default()),
    })
}

/// Builds a database-level grant from the canonical
/// `user_name, host, privilege_names` shape.
fn user_grant(row: &CatalogRow) -> Result<GrantRow> {
    Ok(GrantRow {
        table_name: None,
        user_name: row.text(0, "user_name")?.to_string(),
        host: row.get(1).unwrap_or_default().to_string(),
        privileges: split_privileges(row.get(2).unwrap_or_default()),
    })
}
