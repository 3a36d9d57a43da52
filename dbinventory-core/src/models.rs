//! Inventory data model.
//!
//! Every record is built fresh during a pass and dropped once it has been
//! handed to the publisher. Nothing here is cached between passes.

use crate::{InventoryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Relational engines the agent can inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineType {
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "postgres")]
    Postgres,
    #[serde(rename = "mssql")]
    SqlServer,
    #[serde(rename = "oracle")]
    Oracle,
}

impl EngineType {
    /// All supported engines, in catalog order.
    pub const ALL: [Self; 4] = [Self::MySql, Self::Postgres, Self::SqlServer, Self::Oracle];

    /// Canonical tag reported in the `databaseType` payload key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::SqlServer => "mssql",
            Self::Oracle => "oracle",
        }
    }

    /// Port the engine listens on when none is configured.
    pub const fn default_port(self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::Postgres => 5432,
            Self::SqlServer => 1433,
            Self::Oracle => 1521,
        }
    }

    /// Database the connector logs into when none is configured.
    pub const fn default_database(self) -> Option<&'static str> {
        match self {
            Self::MySql => None,
            Self::Postgres => Some("postgres"),
            Self::SqlServer => Some("master"),
            Self::Oracle => Some("ORCL"),
        }
    }
}

impl std::fmt::Display for EngineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MySql => write!(f, "MySQL"),
            Self::Postgres => write!(f, "PostgreSQL"),
            Self::SqlServer => write!(f, "SQL Server"),
            Self::Oracle => write!(f, "Oracle"),
        }
    }
}

impl FromStr for EngineType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mssql" | "sqlserver" | "sql server" => Ok(Self::SqlServer),
            "oracle" => Ok(Self::Oracle),
            other => Err(InventoryError::configuration(format!(
                "unknown engine type '{other}' (expected mysql, postgres, mssql or oracle)"
            ))),
        }
    }
}

/// Reported operational status of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LivenessState {
    Active,
    #[serde(rename = "In Recovery")]
    InRecovery,
    Inactive,
    Unknown,
}

impl LivenessState {
    /// Value sent in the `status` payload key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::InRecovery => "In Recovery",
            Self::Inactive => "Inactive",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for LivenessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Privilege names that make a grantee an administrator on any engine.
pub const ELEVATED_PRIVILEGES: &[&str] = &[
    // MySQL
    "SUPER",
    "CREATE USER",
    "GRANT OPTION",
    "ALL PRIVILEGES",
    "ALL",
    // PostgreSQL role attributes
    "SUPERUSER",
    "CREATEROLE",
    // SQL Server
    "CONTROL SERVER",
    "CONTROL",
    "ALTER ANY LOGIN",
    // Oracle
    "DBA",
    "GRANT ANY PRIVILEGE",
    "SYSDBA",
];

/// Role classification of a grantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    User,
}

impl Role {
    /// Classifies a privilege set: any elevated privilege means `Admin`.
    ///
    /// ```rust
    /// use dbinventory_core::Role;
    ///
    /// assert_eq!(Role::classify(["SELECT", "SUPER"]), Role::Admin);
    /// assert_eq!(Role::classify(["SELECT", "INSERT"]), Role::User);
    /// ```
    pub fn classify<I, S>(privileges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let elevated = privileges.into_iter().any(|privilege| {
            let privilege = privilege.as_ref().trim();
            ELEVATED_PRIVILEGES
                .iter()
                .any(|elevated| elevated.eq_ignore_ascii_case(privilege))
        });
        if elevated { Self::Admin } else { Self::User }
    }

    /// Value sent in the `role` payload key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::User => "User",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which privilege introspection queries run during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeScope {
    /// Per (table, user) grants only
    Table,
    /// Per user grants at database scope only
    Database,
    /// Both variants
    #[default]
    Both,
}

impl PrivilegeScope {
    /// Whether table-level grants are collected.
    pub const fn includes_table(self) -> bool {
        matches!(self, Self::Table | Self::Both)
    }

    /// Whether database-level user grants are collected.
    pub const fn includes_database(self) -> bool {
        matches!(self, Self::Database | Self::Both)
    }
}

impl FromStr for PrivilegeScope {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "database" => Ok(Self::Database),
            "both" | "" => Ok(Self::Both),
            other => Err(InventoryError::configuration(format!(
                "unknown privilege scope '{other}' (expected table, database or both)"
            ))),
        }
    }
}

/// One discovered, non-system database and its liveness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    name: String,
    engine_type: EngineType,
    status: LivenessState,
}

impl DatabaseRecord {
    /// Creates a database record.
    pub fn new(name: impl Into<String>, engine_type: EngineType, status: LivenessState) -> Self {
        Self {
            name: name.into(),
            engine_type,
            status,
        }
    }

    /// Database name as listed by the server.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine_type(&self) -> EngineType {
        self.engine_type
    }

    /// Liveness observed during the pass.
    pub fn status(&self) -> LivenessState {
        self.status
    }
}

/// Grants held by one user on one database, or on one table when
/// `table_name` is set.
///
/// The role is derived from the privilege set at construction and the record
/// exposes no mutators, so the two never drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeRecord {
    database_name: String,
    table_name: Option<String>,
    user_name: String,
    host: String,
    role: Role,
    privileges: BTreeSet<String>,
}

impl PrivilegeRecord {
    /// Creates a privilege record and classifies its role.
    pub fn new(
        database_name: impl Into<String>,
        table_name: Option<String>,
        user_name: impl Into<String>,
        host: impl Into<String>,
        privileges: BTreeSet<String>,
    ) -> Self {
        let role = Role::classify(&privileges);
        Self {
            database_name: database_name.into(),
            table_name,
            user_name: user_name.into(),
            host: host.into(),
            role,
            privileges,
        }
    }

    /// Database the grants apply to.
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    /// Table the grants apply to, for table-level records.
    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }

    /// Grantee user name.
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Grantee host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Role derived from the privilege set.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Granted privilege names.
    pub fn privileges(&self) -> &BTreeSet<String> {
        &self.privileges
    }

    /// Privileges joined with commas for transport, in sorted order.
    pub fn privilege_list(&self) -> String {
        self.privileges
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Whether this record describes a single table.
    pub fn is_table_level(&self) -> bool {
        self.table_name.is_some()
    }
}

/// Any record produced by a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryRecord {
    Database(DatabaseRecord),
    Privilege(PrivilegeRecord),
}

impl From<DatabaseRecord> for InventoryRecord {
    fn from(record: DatabaseRecord) -> Self {
        Self::Database(record)
    }
}

impl From<PrivilegeRecord> for InventoryRecord {
    fn from(record: PrivilegeRecord) -> Self {
        Self::Privilege(record)
    }
}
