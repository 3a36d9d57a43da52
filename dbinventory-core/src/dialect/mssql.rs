//! SQL Server catalog rows.

use super::{CatalogRow, DialectEntry, Operation, RowAdapter, SessionScope};
use crate::models::{EngineType, LivenessState};

pub(super) const ENTRIES: &[DialectEntry] = &[
    DialectEntry {
        engine: EngineType::SqlServer,
        operation: Operation::ListDatabases,
        query: "SELECT name AS database_name
FROM sys.databases
ORDER BY database_id",
        shape: &["database_name"],
        binds_database: false,
        session: SessionScope::Server,
        adapter: RowAdapter::DatabaseName(super::first_column_name),
    },
    DialectEntry {
        engine: EngineType::SqlServer,
        operation: Operation::DatabaseStatus,
        query: "SELECT state_desc AS state_desc
FROM sys.databases
WHERE name = @P1",
        shape: &["state_desc"],
        binds_database: true,
        session: SessionScope::Server,
        adapter: RowAdapter::Liveness(state_liveness),
    },
    // INFORMATION_SCHEMA views only describe the session's current database.
    DialectEntry {
        engine: EngineType::SqlServer,
        operation: Operation::TablePrivileges,
        query: "SELECT CAST(TABLE_CATALOG AS nvarchar(128)) AS database_name,
       CAST(TABLE_SCHEMA + '.' + TABLE_NAME AS nvarchar(256)) AS table_name,
       CAST(GRANTEE AS nvarchar(128)) AS user_name,
       CONVERT(nvarchar(128), SERVERPROPERTY('MachineName')) AS host,
       STRING_AGG(CAST(PRIVILEGE_TYPE AS nvarchar(max)), ',') AS privilege_names
FROM INFORMATION_SCHEMA.TABLE_PRIVILEGES
WHERE TABLE_CATALOG = @P1
GROUP BY TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME, GRANTEE",
        shape: &["database_name", "table_name", "user_name", "host", "privilege_names"],
        binds_database: true,
        session: SessionScope::Database,
        adapter: RowAdapter::Grant(super::table_grant),
    },
    // Logins are server-wide; sysadmin membership is reported as CONTROL SERVER.
    DialectEntry {
        engine: EngineType::SqlServer,
        operation: Operation::DatabaseUserPrivileges,
        query: "SELECT p.name AS user_name,
       CONVERT(nvarchar(128), SERVERPROPERTY('MachineName')) AS host,
       STRING_AGG(CAST(p.permission_name AS nvarchar(max)), ',') AS privilege_names
FROM (
    SELECT sp.name, perm.permission_name
    FROM sys.server_permissions perm
    JOIN sys.server_principals sp ON sp.principal_id = perm.grantee_principal_id
    WHERE perm.state IN ('G', 'W') AND sp.type IN ('S', 'U', 'G')
    UNION
    SELECT sp.name, 'CONTROL SERVER'
    FROM sys.server_role_members rm
    JOIN sys.server_principals r ON r.principal_id = rm.role_principal_id
    JOIN sys.server_principals sp ON sp.principal_id = rm.member_principal_id
    WHERE r.name = 'sysadmin'
) p
GROUP BY p.name",
        shape: &["user_name", "host", "privilege_names"],
        binds_database: false,
        session: SessionScope::Server,
        adapter: RowAdapter::Grant(super::user_grant),
    },
];

fn state_liveness(rows: &[CatalogRow]) -> LivenessState {
    let state = rows
        .first()
        .and_then(|row| row.get(0))
        .map(|s| s.trim().to_ascii_uppercase());
    match state.as_deref() {
        Some("ONLINE") => LivenessState::Active,
        Some("RECOVERING" | "RECOVERY_PENDING" | "RESTORING") => LivenessState::InRecovery,
        Some("OFFLINE" | "SUSPECT" | "EMERGENCY") => LivenessState::Inactive,
        _ => LivenessState::Unknown,
    }
}
