//! MySQL and MariaDB catalog rows.
//!
//! Grantees come back in `'user'@'host'` form and are split in
//! [`parse_grantee`]. Privilege queries read `information_schema`, which
//! only shows grants the connected account may see.

use super::{CatalogRow, DialectEntry, GrantRow, Operation, RowAdapter, SessionScope, split_privileges};
use crate::models::{EngineType, LivenessState};
use crate::{InventoryError, Result};

pub(super) const ENTRIES: &[DialectEntry] = &[
    DialectEntry {
        engine: EngineType::MySql,
        operation: Operation::ListDatabases,
        query: "SHOW DATABASES",
        shape: &["Database"],
        binds_database: false,
        session: SessionScope::Server,
        adapter: RowAdapter::DatabaseName(super::first_column_name),
    },
    DialectEntry {
        engine: EngineType::MySql,
        operation: Operation::DatabaseStatus,
        query: "SHOW GLOBAL STATUS LIKE 'Uptime'",
        shape: &["Variable_name", "Value"],
        binds_database: false,
        session: SessionScope::Server,
        adapter: RowAdapter::Liveness(uptime_liveness),
    },
    DialectEntry {
        engine: EngineType::MySql,
        operation: Operation::TablePrivileges,
        query: "SELECT TABLE_SCHEMA AS database_name,
       TABLE_NAME AS table_name,
       GRANTEE AS grantee,
       CONCAT_WS(',',
           GROUP_CONCAT(DISTINCT PRIVILEGE_TYPE ORDER BY PRIVILEGE_TYPE SEPARATOR ','),
           IF(MAX(IS_GRANTABLE) = 'YES', 'GRANT OPTION', NULL)) AS privilege_names
FROM information_schema.TABLE_PRIVILEGES
WHERE TABLE_SCHEMA = ?
GROUP BY TABLE_SCHEMA, TABLE_NAME, GRANTEE
ORDER BY TABLE_NAME, GRANTEE",
        shape: &["database_name", "table_name", "grantee", "privilege_names"],
        binds_database: true,
        session: SessionScope::Server,
        adapter: RowAdapter::Grant(table_grant),
    },
    DialectEntry {
        engine: EngineType::MySql,
        operation: Operation::DatabaseUserPrivileges,
        query: "SELECT g.GRANTEE AS grantee,
       GROUP_CONCAT(DISTINCT g.PRIVILEGE_TYPE ORDER BY g.PRIVILEGE_TYPE SEPARATOR ',') AS privilege_names
FROM (
    SELECT GRANTEE, PRIVILEGE_TYPE
    FROM information_schema.SCHEMA_PRIVILEGES
    WHERE TABLE_SCHEMA = ?
    UNION
    SELECT GRANTEE, PRIVILEGE_TYPE
    FROM information_schema.USER_PRIVILEGES
    WHERE PRIVILEGE_TYPE <> 'USAGE'
    UNION
    SELECT GRANTEE, 'GRANT OPTION'
    FROM information_schema.USER_PRIVILEGES
    WHERE IS_GRANTABLE = 'YES'
) g
GROUP BY g.GRANTEE
ORDER BY g.GRANTEE",
        shape: &["grantee", "privilege_names"],
        binds_database: true,
        session: SessionScope::Server,
        adapter: RowAdapter::Grant(user_grant),
    },
];

/// Any positive uptime means the server answers; an empty result means the
/// status variable is gone.
fn uptime_liveness(rows: &[CatalogRow]) -> LivenessState {
    let Some(row) = rows.first() else {
        return LivenessState::Inactive;
    };
    match row.get(1).map(|value| value.trim().parse::<u64>()) {
        Some(Ok(seconds)) if seconds > 0 => LivenessState::Active,
        Some(Ok(_)) => LivenessState::Inactive,
        _ => LivenessState::Unknown,
    }
}

fn table_grant(row: &CatalogRow) -> Result<GrantRow> {
    let (user_name, host) = parse_grantee(row.text(2, "grantee")?)?;
    Ok(GrantRow {
        table_name: Some(row.text(1, "table_name")?.to_string()),
        user_name,
        host,
        privileges: split_privileges(row.get(3).unwrap_or_default()),
    })
}

fn user_grant(row: &CatalogRow) -> Result<GrantRow> {
    let (user_name, host) = parse_grantee(row.text(0, "grantee")?)?;
    Ok(GrantRow {
        table_name: None,
        user_name,
        host,
        privileges: split_privileges(row.get(1).unwrap_or_default()),
    })
}

/// Splits a MySQL grantee such as `'alice'@'localhost'` into user and host.
///
/// The split happens at the last `@`, so user names containing `@` survive.
/// A grantee without a host part is taken as a user on any host (`%`).
pub(super) fn parse_grantee(grantee: &str) -> Result<(String, String)> {
    let (user, host) = grantee.rsplit_once('@').unwrap_or((grantee, "%"));
    let user = unquote(user);
    if user.is_empty() {
        return Err(InventoryError::row_shape(
            "column 'grantee'",
            format!("cannot read a user name from grantee '{grantee}'"),
        ));
    }
    Ok((user.to_string(), unquote(host).to_string()))
}

fn unquote(part: &str) -> &str {
    part.trim().trim_matches(|c| c == '\'' || c == '`' || c == '"')
}
