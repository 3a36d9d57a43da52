//! Database inventory agent.
//!
//! This binary connects to one database server, inventories its user
//! databases and their grants on a fixed interval, and forwards every record
//! to a collector service over HTTP.
//!
//! # Security Guarantees
//! - Read-only database sessions only
//! - Credentials are never written to disk or logged
//! - Connection strings are redacted in all output

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dbinventory_agent::settings::{AgentSettings, DEFAULT_CONFIG_DIR};
use dbinventory_core::{
    Credentials, EngineConfig, EngineType, HttpPublisher, LogFormat, LogOptions, Operation,
    ReportSink, ScanReport, Scheduler, connect, dialect, init_logging, is_system_database, scan,
    system_databases::system_databases,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "dbinventory-agent")]
#[command(about = "Database inventory agent")]
#[command(version)]
#[command(long_about = "
DBInventory Agent - periodic database inventory

The agent connects to a database server and, every TIME_INTERVAL minutes:
- lists its databases, skipping engine system databases
- reports each database and its liveness
- reports table-level and database-level grants per user

Settings are read from db.env in the configuration directory; environment
variables with the same names override the file.

SUPPORTED DATABASES:
- MySQL / MariaDB (mysql)
- PostgreSQL (postgres)
- SQL Server (mssql) [if compiled with --features mssql]

EXAMPLES:
  dbinventory-agent run --host db01 --username inventory
  dbinventory-agent scan-once --host db01 -u inventory --config-dir ./conf
  dbinventory-agent test --host db01 -u inventory
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run passes on the configured interval until interrupted
    Run(ConnectionArgs),
    /// Run a single pass and exit
    ScanOnce(ConnectionArgs),
    /// Test the database connection
    Test(ConnectionArgs),
    /// List supported database types
    List,
}

#[derive(Args)]
pub struct ConnectionArgs {
    /// Database host
    #[arg(long, help = "Database host name or address")]
    pub host: String,

    /// Database username
    #[arg(short, long, help = "Database login name")]
    pub username: String,

    /// Database password
    #[arg(
        long,
        env = "DBINVENTORY_PASSWORD",
        hide_env_values = true,
        help = "Database password (prompted when omitted on a terminal)"
    )]
    pub password: Option<String>,
}

#[derive(Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,

    /// Log file
    #[arg(long, global = true, help = "Append logs to this file instead of stderr")]
    pub log_file: Option<PathBuf>,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,

    /// Configuration directory
    #[arg(
        long,
        global = true,
        env = "DBINVENTORY_CONFIG_DIR",
        default_value = DEFAULT_CONFIG_DIR,
        help = "Directory holding db.env"
    )]
    pub config_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(format: LogFormatArg) -> Self {
        match format {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&LogOptions {
        verbose: cli.global.verbose,
        quiet: cli.global.quiet,
        file: cli.global.log_file.clone(),
        format: cli.global.log_format.into(),
    })?;

    match &cli.command {
        Command::Run(args) => run(&cli.global, args).await,
        Command::ScanOnce(args) => scan_once(&cli.global, args).await,
        Command::Test(args) => test_connection(&cli.global, args).await,
        Command::List => {
            list_supported_databases();
            Ok(())
        }
    }
}

/// Loads settings and credentials into a validated configuration.
fn load_config(global: &GlobalArgs, args: &ConnectionArgs) -> anyhow::Result<EngineConfig> {
    let settings = AgentSettings::load(&global.config_dir).with_context(|| {
        format!("Failed to load settings from {}", global.config_dir.display())
    })?;

    let password = match &args.password {
        Some(password) => password.clone(),
        None if std::io::stdin().is_terminal() => {
            rpassword::prompt_password(format!("Password for {}: ", args.username))
                .context("Failed to read password")?
        }
        None => {
            warn!("No password supplied, connecting without one");
            String::new()
        }
    };
    let credentials = Credentials::new(args.username.clone(), password);

    let config = settings.engine_config(&args.host, credentials)?;
    info!(
        engine = %config.engine_type(),
        host = config.host(),
        port = config.port(),
        interval_minutes = settings.time_interval,
        agent_id = %config.agent_id(),
        "Configuration loaded"
    );
    Ok(config)
}

/// Foreground mode: passes on every tick until SIGINT or SIGTERM.
async fn run(global: &GlobalArgs, args: &ConnectionArgs) -> anyhow::Result<()> {
    let config = Arc::new(load_config(global, args)?);
    let sink: Arc<dyn ReportSink> = Arc::new(HttpPublisher::new(&config)?);
    let connection = connect(&config).await.inspect_err(|e| {
        error!("Failed to connect to database: {}", e);
    })?;

    let handle = Scheduler::new(Arc::clone(&config), connection, sink).spawn();
    info!("Agent started, waiting for the first tick");

    shutdown_signal().await;
    info!("Shutdown requested, letting the current pass finish");

    let summary = handle.stop().await?;
    info!(
        passes = summary.passes,
        failed_passes = summary.failed_passes,
        records_published = summary.records_published,
        issues = summary.issues,
        "Agent stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

/// Runs exactly one pass and prints its summary.
async fn scan_once(global: &GlobalArgs, args: &ConnectionArgs) -> anyhow::Result<()> {
    let config = load_config(global, args)?;
    let sink = HttpPublisher::new(&config)?;
    let connection = connect(&config).await.inspect_err(|e| {
        error!("Failed to connect to database: {}", e);
    })?;

    let result = scan(connection.as_ref(), &sink, &config).await;
    connection.close().await;
    let report = result.context("Inventory pass aborted")?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &ScanReport) {
    println!("Inventory pass completed in {:.1?}", report.elapsed);
    println!("Databases listed: {}", report.databases_listed);
    println!("System databases skipped: {}", report.system_databases_skipped);
    println!("Databases processed: {}", report.databases_processed);
    println!("Records published: {}", report.records_published);
    println!("Issues: {}", report.issues.len());
    for issue in &report.issues {
        match &issue.database {
            Some(database) => println!("  [{}] {}: {}", issue.stage, database, issue.message),
            None => println!("  [{}] {}", issue.stage, issue.message),
        }
    }
}

/// Connects and runs only the listing query.
async fn test_connection(global: &GlobalArgs, args: &ConnectionArgs) -> anyhow::Result<()> {
    info!("Testing database connection...");
    let config = load_config(global, args)?;
    let connection = connect(&config).await.inspect_err(|e| {
        error!("Connection test failed: {}", e);
    })?;

    let engine = config.engine_type();
    let entry = dialect::lookup(engine, Operation::ListDatabases)?;
    let rows = connection.fetch_rows(entry.query, None).await;
    connection.close().await;

    let mut user_databases = 0;
    for row in rows? {
        match entry.database_name(&row) {
            Ok(name) if !is_system_database(&name, engine) => user_databases += 1,
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable listing row: {}", e),
        }
    }

    info!("✓ Connection test successful");
    println!("Connection to {} database successful", engine);
    println!("Non-system databases: {}", user_databases);
    Ok(())
}

/// Lists engine types, their default ports and system databases
fn list_supported_databases() {
    println!("Supported database types:");
    println!();
    for engine in EngineType::ALL {
        let driver = if driver_compiled(engine) {
            "available"
        } else {
            "not compiled in"
        };
        println!(
            "  {:<11} {:<10} port {:<5} driver {}",
            engine.to_string(),
            engine.as_str(),
            engine.default_port(),
            driver
        );
        println!("    system databases: {}", system_databases(engine).join(", "));
    }
    println!();
    println!("Set DB_TYPE in db.env to one of the tags above.");
}

fn driver_compiled(engine: EngineType) -> bool {
    match engine {
        EngineType::MySql => cfg!(feature = "mysql"),
        EngineType::Postgres => cfg!(feature = "postgresql"),
        EngineType::SqlServer => cfg!(feature = "mssql"),
        EngineType::Oracle => false,
    }
}
