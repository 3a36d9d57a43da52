//! PostgreSQL catalog rows.
//!
//! `information_schema.role_table_grants` only covers the database the
//! session is connected to, so the table grant query runs in a session on
//! the target database. Grants are not host-scoped in PostgreSQL; the server
//! address is reported as the host.

use super::{CatalogRow, DialectEntry, Operation, RowAdapter, SessionScope};
use crate::models::{EngineType, LivenessState};

pub(super) const ENTRIES: &[DialectEntry] = &[
    DialectEntry {
        engine: EngineType::Postgres,
        operation: Operation::ListDatabases,
        query: "SELECT datname::text AS database_name
FROM pg_database
ORDER BY datname",
        shape: &["database_name"],
        binds_database: false,
        session: SessionScope::Server,
        adapter: RowAdapter::DatabaseName(super::first_column_name),
    },
    DialectEntry {
        engine: EngineType::Postgres,
        operation: Operation::DatabaseStatus,
        query: "SELECT datallowconn::text AS allow_connections,
       pg_is_in_recovery()::text AS in_recovery
FROM pg_database
WHERE datname = $1",
        shape: &["allow_connections", "in_recovery"],
        binds_database: true,
        session: SessionScope::Server,
        adapter: RowAdapter::Liveness(recovery_liveness),
    },
    DialectEntry {
        engine: EngineType::Postgres,
        operation: Operation::TablePrivileges,
        query: "SELECT table_catalog::text AS database_name,
       (table_schema || '.' || table_name)::text AS table_name,
       grantee::text AS user_name,
       COALESCE(host(inet_server_addr()), 'localhost') AS host,
       string_agg(DISTINCT privilege_type, ',' ORDER BY privilege_type)
           || CASE WHEN bool_or(is_grantable = 'YES') THEN ',GRANT OPTION' ELSE '' END AS privilege_names
FROM information_schema.role_table_grants
WHERE table_catalog = $1
  AND table_schema NOT IN ('pg_catalog', 'information_schema')
GROUP BY table_catalog, table_schema, table_name, grantee
ORDER BY table_schema, table_name, grantee",
        shape: &["database_name", "table_name", "user_name", "host", "privilege_names"],
        binds_database: true,
        session: SessionScope::Database,
        adapter: RowAdapter::Grant(super::table_grant),
    },
    DialectEntry {
        engine: EngineType::Postgres,
        operation: Operation::DatabaseUserPrivileges,
        query: "SELECT r.rolname::text AS user_name,
       COALESCE(host(inet_server_addr()), 'localhost') AS host,
       concat_ws(',',
           CASE WHEN r.rolsuper THEN 'SUPERUSER' END,
           CASE WHEN r.rolcreaterole THEN 'CREATEROLE' END,
           CASE WHEN r.rolcreatedb THEN 'CREATEDB' END,
           CASE WHEN has_database_privilege(r.oid, d.oid, 'CONNECT') THEN 'CONNECT' END,
           CASE WHEN has_database_privilege(r.oid, d.oid, 'CREATE') THEN 'CREATE' END,
           CASE WHEN has_database_privilege(r.oid, d.oid, 'TEMPORARY') THEN 'TEMPORARY' END) AS privilege_names
FROM pg_roles r
CROSS JOIN pg_database d
WHERE d.datname = $1
  AND r.rolcanlogin
ORDER BY r.rolname",
        shape: &["user_name", "host", "privilege_names"],
        binds_database: true,
        session: SessionScope::Server,
        adapter: RowAdapter::Grant(super::user_grant),
    },
];

fn recovery_liveness(rows: &[CatalogRow]) -> LivenessState {
    let Some(row) = rows.first() else {
        return LivenessState::Unknown;
    };
    match (flag(row.get(0)), flag(row.get(1))) {
        (Some(false), _) => LivenessState::Inactive,
        (_, Some(true)) => LivenessState::InRecovery,
        (Some(true), Some(false)) => LivenessState::Active,
        _ => LivenessState::Unknown,
    }
}

/// Reads a boolean rendered as text (`true`/`false` or `t`/`f`).
fn flag(cell: Option<&str>) -> Option<bool> {
    match cell?.trim() {
        "true" | "t" => Some(true),
        "false" | "f" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::lookup;

    fn status(allow: &str, recovery: &str) -> Vec<CatalogRow> {
        vec![CatalogRow::from_texts([allow, recovery])]
    }

    #[test]
    fn test_recovery_liveness() {
        assert_eq!(recovery_liveness(&status("true", "false")), LivenessState::Active);
        assert_eq!(recovery_liveness(&status("t", "t")), LivenessState::InRecovery);
        assert_eq!(recovery_liveness(&status("false", "false")), LivenessState::Inactive);
        assert_eq!(recovery_liveness(&status("false", "true")), LivenessState::Inactive);
        assert_eq!(recovery_liveness(&status("maybe", "false")), LivenessState::Unknown);
        assert_eq!(recovery_liveness(&[]), LivenessState::Unknown);
    }

    #[test]
    fn test_table_grant() {
        let entry = lookup(EngineType::Postgres, Operation::TablePrivileges).unwrap();
        let row = CatalogRow::from_texts(["appdb", "public.orders", "reporting", "10.0.0.5", "SELECT"]);
        let grant = entry.grant(&row).unwrap();
        assert_eq!(grant.table_name.as_deref(), Some("public.orders"));
        assert_eq!(grant.user_name, "reporting");
        assert_eq!(grant.host, "10.0.0.5");
        assert!(grant.privileges.contains("SELECT"));
    }

    #[test]
    fn test_user_grant_with_role_attributes() {
        let entry = lookup(EngineType::Postgres, Operation::DatabaseUserPrivileges).unwrap();
        let row = CatalogRow::from_texts(["postgres", "localhost", "SUPERUSER,CREATEROLE,CONNECT"]);
        let grant = entry.grant(&row).unwrap();
        assert_eq!(grant.user_name, "postgres");
        assert_eq!(grant.privileges.len(), 3);
    }
}
