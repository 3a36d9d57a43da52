//! Oracle catalog rows.
//!
//! Oracle has no separate databases inside an instance; schemas (users)
//! stand in for them. Reading `dba_*` views needs SELECT_CATALOG_ROLE.

use super::{CatalogRow, DialectEntry, Operation, RowAdapter, SessionScope};
use crate::models::{EngineType, LivenessState};

pub(super) const ENTRIES: &[DialectEntry] = &[
    DialectEntry {
        engine: EngineType::Oracle,
        operation: Operation::ListDatabases,
        query: "SELECT username AS database_name
FROM all_users
ORDER BY username",
        shape: &["database_name"],
        binds_database: false,
        session: SessionScope::Server,
        adapter: RowAdapter::DatabaseName(super::first_column_name),
    },
    DialectEntry {
        engine: EngineType::Oracle,
        operation: Operation::DatabaseStatus,
        query: "SELECT open_mode AS open_mode
FROM v$database",
        shape: &["open_mode"],
        binds_database: false,
        session: SessionScope::Server,
        adapter: RowAdapter::Liveness(open_mode_liveness),
    },
    DialectEntry {
        engine: EngineType::Oracle,
        operation: Operation::TablePrivileges,
        query: "SELECT owner AS database_name,
       table_name AS table_name,
       grantee AS user_name,
       SYS_CONTEXT('USERENV', 'SERVER_HOST') AS host,
       LISTAGG(privilege, ',') WITHIN GROUP (ORDER BY privilege) AS privilege_names
FROM dba_tab_privs
WHERE owner = :1
GROUP BY owner, table_name, grantee",
        shape: &["database_name", "table_name", "user_name", "host", "privilege_names"],
        binds_database: true,
        session: SessionScope::Server,
        adapter: RowAdapter::Grant(super::table_grant),
    },
    DialectEntry {
        engine: EngineType::Oracle,
        operation: Operation::DatabaseUserPrivileges,
        query: "SELECT p.grantee AS user_name,
       SYS_CONTEXT('USERENV', 'SERVER_HOST') AS host,
       LISTAGG(p.privilege, ',') WITHIN GROUP (ORDER BY p.privilege) AS privilege_names
FROM (
    SELECT grantee, privilege FROM dba_sys_privs
    UNION
    SELECT grantee, granted_role FROM dba_role_privs
) p
WHERE p.grantee = :1
GROUP BY p.grantee",
        shape: &["user_name", "host", "privilege_names"],
        binds_database: true,
        session: SessionScope::Server,
        adapter: RowAdapter::Grant(super::user_grant),
    },
];

fn open_mode_liveness(rows: &[CatalogRow]) -> LivenessState {
    let Some(mode) = rows.first().and_then(|row| row.get(0)) else {
        return LivenessState::Inactive;
    };
    let mode = mode.trim().to_ascii_uppercase();
    if mode.contains("WITH APPLY") {
        LivenessState::InRecovery
    } else if mode.starts_with("READ") {
        LivenessState::Active
    } else if mode == "MOUNTED" {
        LivenessState::InRecovery
    } else {
        LivenessState::Inactive
    }
}
