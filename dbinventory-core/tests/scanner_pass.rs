//! Inventory pass behavior against a scripted server.
//!
//! Covers:
//! - the MySQL `appdb` discovery and role classification scenario
//! - table grants read in a session on the target database
//! - query budgets and system database exclusion
//! - containment of query, row and publish failures
//! - pass aborts on listing failure and lost connections
//! - repeatability of consecutive passes

mod common;

use common::{Failure, RecordingSink, ScriptedConnection, config, config_with_scope, database_of, rows};
use dbinventory_core::dialect::Operation;
use dbinventory_core::publisher::{EndpointKind, ReportEnvelope};
use dbinventory_core::{
    EngineType, LivenessState, PrivilegeScope, Role, ScanStage, is_system_database, scan,
};

#[tokio::test]
async fn test_mysql_appdb_is_reported_active() {
    let connection = ScriptedConnection::mysql_appdb();
    let sink = RecordingSink::new();
    let config = config(EngineType::MySql);

    let report = scan(&connection, &sink, &config).await.unwrap();

    assert_eq!(report.databases_listed, 5);
    assert_eq!(report.system_databases_skipped, 4);
    assert_eq!(report.databases_processed, 1);
    assert!(report.is_clean(), "unexpected issues: {:?}", report.issues);

    let synced = sink.to(EndpointKind::DbSync);
    assert_eq!(synced.len(), 1);
    let ReportEnvelope::DbSync(payload) = &synced[0] else {
        panic!("expected a dbSync report");
    };
    assert_eq!(payload.database_name, "appdb");
    assert_eq!(payload.status, LivenessState::Active);
    assert_eq!(payload.org_id, 42);
    assert_eq!(payload.tenant_id, 7);
    assert_eq!(payload.database_type, EngineType::MySql);
    assert_eq!(payload.port, 3306);
    assert_eq!(payload.host, "db01.internal");
}

#[tokio::test]
async fn test_mysql_roles_follow_privileges() {
    let connection = ScriptedConnection::mysql_appdb();
    let sink = RecordingSink::new();

    scan(&connection, &sink, &config(EngineType::MySql)).await.unwrap();

    let users: Vec<_> = sink
        .to(EndpointKind::DbUser)
        .into_iter()
        .filter_map(|envelope| match envelope {
            ReportEnvelope::DbUser(payload) => Some(payload),
            _ => None,
        })
        .collect();
    assert_eq!(users.len(), 2);

    let bob = users.iter().find(|u| u.user_name == "bob").unwrap();
    assert_eq!(bob.host, "localhost");
    assert_eq!(bob.role, Role::User);
    assert_eq!(bob.privilege, "SELECT");

    let alice = users.iter().find(|u| u.user_name == "alice").unwrap();
    assert_eq!(alice.role, Role::Admin);
    assert_eq!(alice.privilege, "SELECT,SUPER");

    let tables = sink.to(EndpointKind::DbPrivilege);
    assert_eq!(tables.len(), 1);
    let ReportEnvelope::DbPrivilege(grant) = &tables[0] else {
        panic!("expected a dbPrivilege report");
    };
    assert_eq!(grant.table_name.as_deref(), Some("orders"));
    assert_eq!(grant.user_name, "bob");
    assert_eq!(grant.privilege_type, "SELECT");
}

#[tokio::test]
async fn test_postgres_table_grants_use_target_database_session() {
    let connection = ScriptedConnection::postgres_with(&["sales", "hr"]);
    let sink = RecordingSink::new();

    scan(&connection, &sink, &config(EngineType::Postgres)).await.unwrap();

    assert_eq!(
        connection.sessions(),
        [
            (Operation::TablePrivileges, "sales".to_string()),
            (Operation::TablePrivileges, "hr".to_string()),
        ]
    );
    let tables: Vec<_> = sink
        .to(EndpointKind::DbPrivilege)
        .into_iter()
        .filter_map(|envelope| match envelope {
            ReportEnvelope::DbPrivilege(payload) => Some((payload.database_name, payload.table_name)),
            _ => None,
        })
        .collect();
    assert_eq!(
        tables,
        [
            ("sales".to_string(), Some("public.sales_events".to_string())),
            ("hr".to_string(), Some("public.hr_events".to_string())),
        ]
    );
}

#[tokio::test]
async fn test_mssql_table_grants_use_target_database_session() {
    let connection = ScriptedConnection::new(EngineType::SqlServer)
        .with_rows(
            Operation::ListDatabases,
            None,
            common::names(&["master", "tempdb", "model", "msdb", "appdb"]),
        )
        .with_rows(Operation::DatabaseStatus, Some("appdb"), rows(&[["ONLINE"]]))
        .with_rows(
            Operation::TablePrivileges,
            Some("appdb"),
            rows(&[["appdb", "dbo.orders", "bob", "SQL01", "SELECT"]]),
        );
    let sink = RecordingSink::new();

    let report = scan(&connection, &sink, &config(EngineType::SqlServer)).await.unwrap();

    assert!(report.is_clean(), "unexpected issues: {:?}", report.issues);
    assert_eq!(connection.sessions(), [(Operation::TablePrivileges, "appdb".to_string())]);
    let tables = sink.to(EndpointKind::DbPrivilege);
    assert_eq!(tables.len(), 1);
    let ReportEnvelope::DbPrivilege(grant) = &tables[0] else {
        panic!("expected a dbPrivilege report");
    };
    assert_eq!(grant.database_name, "appdb");
    assert_eq!(grant.table_name.as_deref(), Some("dbo.orders"));
    assert_eq!(grant.user_name, "bob");
}

#[tokio::test]
async fn test_server_wide_catalogs_stay_on_server_session() {
    let connection = ScriptedConnection::mysql_appdb();
    let sink = RecordingSink::new();

    scan(&connection, &sink, &config(EngineType::MySql)).await.unwrap();

    assert!(connection.sessions().is_empty());
    assert_eq!(sink.to(EndpointKind::DbPrivilege).len(), 1);
}

#[tokio::test]
async fn test_every_report_carries_configured_identifiers() {
    let connection = ScriptedConnection::postgres_with(&["sales", "hr"]);
    let sink = RecordingSink::new();

    scan(&connection, &sink, &config(EngineType::Postgres)).await.unwrap();

    let value = serde_json::to_value(sink.accepted()).unwrap();
    let reports = value.as_array().unwrap();
    assert_eq!(reports.len(), 6);
    for report in reports {
        assert_eq!(report["orgId"], 42);
        assert_eq!(report["tenantId"], 7);
        assert_eq!(report["databaseType"], "postgres");
    }
}

#[tokio::test]
async fn test_query_budget_and_system_exclusion() {
    let databases = ["sales", "hr", "billing"];
    let connection = ScriptedConnection::postgres_with(&databases);
    let sink = RecordingSink::new();

    let report = scan(&connection, &sink, &config(EngineType::Postgres)).await.unwrap();

    let n = databases.len();
    assert_eq!(report.databases_processed, n);
    assert_eq!(report.system_databases_skipped, 3);
    assert_eq!(connection.count(Operation::ListDatabases), 1);
    assert!(connection.count(Operation::DatabaseStatus) <= n);
    assert!(connection.count(Operation::TablePrivileges) <= n);
    assert!(connection.count(Operation::DatabaseUserPrivileges) <= n);

    for (_, database) in connection.calls() {
        if let Some(database) = database {
            assert!(!is_system_database(&database, EngineType::Postgres), "queried {database}");
        }
    }
    for envelope in sink.accepted() {
        assert!(!is_system_database(database_of(&envelope), EngineType::Postgres));
    }
}

#[tokio::test]
async fn test_databases_are_processed_in_listing_order() {
    let connection = ScriptedConnection::postgres_with(&["zeta", "alpha", "mid"]);
    let sink = RecordingSink::new();

    scan(&connection, &sink, &config(EngineType::Postgres)).await.unwrap();

    let order: Vec<_> = sink
        .to(EndpointKind::DbSync)
        .iter()
        .map(|envelope| database_of(envelope).to_string())
        .collect();
    assert_eq!(order, ["zeta", "alpha", "mid"]);

    // Status comes before privileges within each database.
    let calls = connection.calls();
    let status = calls
        .iter()
        .position(|c| *c == (Operation::DatabaseStatus, Some("alpha".to_string())))
        .unwrap();
    let grants = calls
        .iter()
        .position(|c| *c == (Operation::TablePrivileges, Some("alpha".to_string())))
        .unwrap();
    assert!(status < grants);
}

#[tokio::test]
async fn test_query_failure_is_contained_to_one_database() {
    let connection = ScriptedConnection::postgres_with(&["sales", "hr", "billing"])
        .failing(Operation::DatabaseStatus, Some("hr"), Failure::Query)
        .failing(Operation::TablePrivileges, Some("hr"), Failure::Query);
    let sink = RecordingSink::new();

    let report = scan(&connection, &sink, &config(EngineType::Postgres)).await.unwrap();

    assert_eq!(report.databases_processed, 3);
    let synced: Vec<_> = sink
        .to(EndpointKind::DbSync)
        .into_iter()
        .filter_map(|envelope| match envelope {
            ReportEnvelope::DbSync(payload) => Some((payload.database_name, payload.status)),
            _ => None,
        })
        .collect();
    assert_eq!(
        synced,
        [
            ("sales".to_string(), LivenessState::Active),
            ("hr".to_string(), LivenessState::Unknown),
            ("billing".to_string(), LivenessState::Active),
        ]
    );

    // hr still reports its database-level grants.
    assert!(
        sink.to(EndpointKind::DbUser)
            .iter()
            .any(|envelope| database_of(envelope) == "hr")
    );
    assert_eq!(report.issues.len(), 2);
    assert!(report.issues.iter().all(|i| i.database.as_deref() == Some("hr")));
    let stages: Vec<_> = report.issues.iter().map(|i| i.stage).collect();
    assert_eq!(stages, [ScanStage::Status, ScanStage::TablePrivileges]);
}

#[tokio::test]
async fn test_unreadable_row_is_skipped() {
    let connection = ScriptedConnection::mysql_appdb().with_rows(
        Operation::TablePrivileges,
        Some("appdb"),
        vec![
            dbinventory_core::CatalogRow::from_texts(["appdb", "orders"]),
            dbinventory_core::CatalogRow::from_texts(["appdb", "items", "'bob'@'localhost'", "SELECT"]),
        ],
    );
    let sink = RecordingSink::new();

    let report = scan(&connection, &sink, &config(EngineType::MySql)).await.unwrap();

    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].stage, ScanStage::TablePrivileges);
    assert_eq!(sink.to(EndpointKind::DbPrivilege).len(), 1);
}

#[tokio::test]
async fn test_publish_failure_does_not_stop_the_pass() {
    let connection = ScriptedConnection::postgres_with(&["sales", "hr"]);
    let sink = RecordingSink::failing_when(|envelope| {
        envelope.endpoint() == EndpointKind::DbSync && database_of(envelope) == "sales"
    });

    let report = scan(&connection, &sink, &config(EngineType::Postgres)).await.unwrap();

    assert_eq!(sink.attempts(), 6);
    assert_eq!(sink.accepted().len(), 5);
    assert_eq!(report.records_published, 5);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].stage, ScanStage::Publish);
    assert!(report.issues[0].message.contains("503"));
    assert!(
        sink.to(EndpointKind::DbSync)
            .iter()
            .any(|envelope| database_of(envelope) == "hr")
    );
}

#[tokio::test]
async fn test_listing_failure_aborts_with_no_reports() {
    let connection = ScriptedConnection::mysql_appdb().fail_listing_times(1);
    let sink = RecordingSink::new();
    let config = config(EngineType::MySql);

    let error = scan(&connection, &sink, &config).await.unwrap_err();

    assert!(error.is_connection_error());
    assert_eq!(sink.attempts(), 0);
    assert_eq!(connection.calls().len(), 1);

    // The next pass starts from scratch.
    let report = scan(&connection, &sink, &config).await.unwrap();
    assert_eq!(report.databases_processed, 1);
    assert_eq!(sink.to(EndpointKind::DbSync).len(), 1);
}

#[tokio::test]
async fn test_lost_connection_aborts_mid_pass() {
    let connection = ScriptedConnection::postgres_with(&["sales", "hr", "billing"]).failing(
        Operation::DatabaseStatus,
        Some("hr"),
        Failure::Connection,
    );
    let sink = RecordingSink::new();

    let error = scan(&connection, &sink, &config(EngineType::Postgres)).await.unwrap_err();

    assert!(error.is_connection_error());
    assert!(sink.accepted().iter().all(|envelope| database_of(envelope) == "sales"));
    assert!(
        !connection
            .calls()
            .iter()
            .any(|(_, database)| database.as_deref() == Some("billing"))
    );
}

#[tokio::test]
async fn test_consecutive_passes_are_identical() {
    let connection = ScriptedConnection::mysql_appdb();
    let config = config(EngineType::MySql);

    let first = RecordingSink::new();
    scan(&connection, &first, &config).await.unwrap();
    let second = RecordingSink::new();
    scan(&connection, &second, &config).await.unwrap();

    assert!(!first.accepted().is_empty());
    assert_eq!(first.accepted(), second.accepted());
}

#[tokio::test]
async fn test_table_scope_skips_database_grants() {
    let connection = ScriptedConnection::mysql_appdb();
    let sink = RecordingSink::new();
    let config = config_with_scope(EngineType::MySql, PrivilegeScope::Table);

    scan(&connection, &sink, &config).await.unwrap();

    assert_eq!(connection.count(Operation::DatabaseUserPrivileges), 0);
    assert_eq!(connection.count(Operation::TablePrivileges), 1);
    assert!(sink.to(EndpointKind::DbUser).is_empty());
}

#[tokio::test]
async fn test_status_mapping_reaches_report() {
    let connection = ScriptedConnection::postgres_with(&["replica"]).with_rows(
        Operation::DatabaseStatus,
        Some("replica"),
        rows(&[["true", "true"]]),
    );
    let sink = RecordingSink::new();

    scan(&connection, &sink, &config(EngineType::Postgres)).await.unwrap();

    let value = serde_json::to_value(sink.to(EndpointKind::DbSync)).unwrap();
    assert_eq!(value[0]["status"], "In Recovery");
}

#[tokio::test]
async fn test_empty_server_completes_cleanly() {
    let connection = ScriptedConnection::new(EngineType::SqlServer).with_rows(
        Operation::ListDatabases,
        None,
        common::names(&["master", "tempdb", "model", "msdb"]),
    );
    let sink = RecordingSink::new();

    let report = scan(&connection, &sink, &config(EngineType::SqlServer)).await.unwrap();

    assert_eq!(report.databases_processed, 0);
    assert_eq!(report.system_databases_skipped, 4);
    assert_eq!(sink.attempts(), 0);
}
