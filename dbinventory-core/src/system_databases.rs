//! Engine-bundled databases excluded from inventory.

use crate::models::EngineType;

const MYSQL: &[&str] = &["mysql", "information_schema", "performance_schema", "sys"];
const POSTGRES: &[&str] = &["postgres", "template0", "template1"];
const MSSQL: &[&str] = &["master", "tempdb", "model", "msdb"];
const ORACLE: &[&str] = &[
    "SYSTEM",
    "SYSAUX",
    "SYS",
    "XDB",
    "OUTLN",
    "DBSNMP",
    "APPQOSSYS",
    "AUDSYS",
];

/// Fixed list of system database names for an engine.
pub const fn system_databases(engine: EngineType) -> &'static [&'static str] {
    match engine {
        EngineType::MySql => MYSQL,
        EngineType::Postgres => POSTGRES,
        EngineType::SqlServer => MSSQL,
        EngineType::Oracle => ORACLE,
    }
}

/// Checks whether a database name belongs to the engine itself.
///
/// MySQL and PostgreSQL names are matched exactly (`MySQL` on Linux and
/// quoted Postgres identifiers are case-sensitive); SQL Server and Oracle
/// identifiers are case-insensitive.
///
/// ```rust
/// use dbinventory_core::{EngineType, is_system_database};
///
/// assert!(is_system_database("information_schema", EngineType::MySql));
/// assert!(!is_system_database("appdb", EngineType::MySql));
/// assert!(is_system_database("TempDB", EngineType::SqlServer));
/// ```
pub fn is_system_database(name: &str, engine: EngineType) -> bool {
    let names = system_databases(engine);
    match engine {
        EngineType::MySql | EngineType::Postgres => names.contains(&name),
        EngineType::SqlServer | EngineType::Oracle => {
            names.iter().any(|system| system.eq_ignore_ascii_case(name))
        }
    }
}
