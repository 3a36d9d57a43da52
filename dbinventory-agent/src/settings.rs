//! Agent settings from a `db.env` file with environment overrides.
//!
//! The file holds plain `KEY=value` lines. Any key may be overridden by a
//! process environment variable of the same name. Credentials never live in
//! this file; they come from the command line.

use dbinventory_core::{
    Credentials, EngineConfig, EngineType, InventoryError, PrivilegeScope, Result,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Settings file name inside the configuration directory.
pub const CONFIG_FILE_NAME: &str = "db.env";

/// Configuration directory used when none is given.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/dbinventory";

/// Keys read from the settings file and the environment.
pub const KEYS: [&str; 7] = [
    "ORG_ID",
    "TENANT_ID",
    "DB_TYPE",
    "DB_PORT",
    "TIME_INTERVAL",
    "API",
    "PRIVILEGE_SCOPE",
];

/// Parses `KEY=value` lines.
///
/// Blank lines and `#` comments are skipped, an `export ` prefix is
/// accepted, and matching single or double quotes around a value are
/// removed.
///
/// # Errors
/// Returns a configuration error naming the first line without `=`
pub fn parse_env_file(contents: &str) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();

    for (index, raw) in contents.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            return Err(InventoryError::configuration(format!(
                "{CONFIG_FILE_NAME} line {}: expected KEY=value",
                index + 1
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(InventoryError::configuration(format!(
                "{CONFIG_FILE_NAME} line {}: empty key",
                index + 1
            )));
        }
        values.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    Ok(values)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Reads `db.env` from `dir`.
///
/// A missing file is not an error: the environment may carry every key.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed
pub fn load_file(dir: &Path) -> Result<BTreeMap<String, String>> {
    let path = dir.join(CONFIG_FILE_NAME);
    match std::fs::read_to_string(&path) {
        Ok(contents) => {
            debug!(path = %path.display(), "Loaded settings file");
            parse_env_file(&contents)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Settings file not found, using environment only");
            Ok(BTreeMap::new())
        }
        Err(e) => Err(InventoryError::Io {
            context: format!("Failed to read {}", path.display()),
            source: e,
        }),
    }
}

/// Replaces file values with non-empty values from `lookup`.
pub fn overlay<F>(mut values: BTreeMap<String, String>, lookup: F) -> BTreeMap<String, String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in KEYS {
        if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
            values.insert(key.to_string(), value);
        }
    }
    values
}

/// Typed agent settings, before credentials and host are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub org_id: i64,
    pub tenant_id: i64,
    pub engine_type: EngineType,
    pub port: Option<u16>,
    /// Minutes between passes
    pub time_interval: u64,
    pub api: String,
    pub privilege_scope: PrivilegeScope,
    /// Directory the settings were read from
    pub source: PathBuf,
}

impl AgentSettings {
    /// Loads `db.env` from `dir` and applies process environment overrides.
    ///
    /// # Errors
    /// Returns a configuration error for missing or malformed keys
    pub fn load(dir: &Path) -> Result<Self> {
        let values = overlay(load_file(dir)?, |key| std::env::var(key).ok());
        Self::from_values(&values, dir)
    }

    /// Builds typed settings from raw key/value pairs.
    ///
    /// # Errors
    /// Returns a configuration error naming the offending key
    pub fn from_values(values: &BTreeMap<String, String>, source: &Path) -> Result<Self> {
        let port = match optional(values, "DB_PORT") {
            Some(raw) => Some(parse_number::<u16>("DB_PORT", raw)?),
            None => None,
        };
        let privilege_scope = match optional(values, "PRIVILEGE_SCOPE") {
            Some(raw) => raw.parse()?,
            None => PrivilegeScope::default(),
        };

        let time_interval = parse_number::<u64>("TIME_INTERVAL", require(values, "TIME_INTERVAL")?)?;
        if time_interval == 0 {
            return Err(InventoryError::configuration(
                "TIME_INTERVAL must be at least 1 minute",
            ));
        }

        Ok(Self {
            org_id: parse_number("ORG_ID", require(values, "ORG_ID")?)?,
            tenant_id: parse_number("TENANT_ID", require(values, "TENANT_ID")?)?,
            engine_type: require(values, "DB_TYPE")?.parse()?,
            port,
            time_interval,
            api: require(values, "API")?.to_string(),
            privilege_scope,
            source: source.to_path_buf(),
        })
    }

    /// Combines these settings with the connection target into an
    /// [`EngineConfig`].
    ///
    /// # Errors
    /// Returns a configuration error if the combined values do not validate
    pub fn engine_config(&self, host: &str, credentials: Credentials) -> Result<EngineConfig> {
        let mut builder = EngineConfig::builder(self.engine_type)
            .host(host)
            .credentials(credentials)
            .org_id(self.org_id)
            .tenant_id(self.tenant_id)
            .sync_interval_minutes(self.time_interval)
            .collector_url(self.api.as_str())
            .privilege_scope(self.privilege_scope);
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        builder.build()
    }
}

fn optional<'a>(values: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    values
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn require<'a>(values: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str> {
    optional(values, key).ok_or_else(|| {
        InventoryError::configuration(format!(
            "{key} is not set in {CONFIG_FILE_NAME} or the environment"
        ))
    })
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse().map_err(|_| {
        InventoryError::configuration(format!("{key} must be a number, got '{raw}'"))
    })
}
