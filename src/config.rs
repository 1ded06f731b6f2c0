//! Process configuration loaded from the environment.
//!
//! Values are read once at startup (after `dotenv` has populated the process
//! environment from a `.env` file, when present). Any value that is present
//! but unusable is a fatal [`AppError::Config`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;
use crate::salesforce::ObjectNaming;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

pub const ENV_BIND_ADDR: &str = "STAMPEDE_BIND_ADDR";
pub const ENV_DB_PATH: &str = "STAMPEDE_DB_PATH";
pub const ENV_POLL_INTERVAL_SECS: &str = "STAMPEDE_POLL_INTERVAL_SECS";
pub const ENV_MAX_WAIT_SECS: &str = "STAMPEDE_MAX_WAIT_SECS";
pub const ENV_MAX_CONCURRENT_UPLOADS: &str = "STAMPEDE_MAX_CONCURRENT_UPLOADS";
pub const ENV_OBJECT_NAMING: &str = "STAMPEDE_OBJECT_NAMING";

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_DB_PATH: &str = "stampede.db";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
/// 30 minutes.
const DEFAULT_MAX_WAIT_SECS: u64 = 30 * 60;
const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 3;

// ─────────────────────────────────────────────────────────────────────────────
// AppConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Settings shared by the server and the CLI.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    /// Delay between job status polls while waiting for a batch.
    pub poll_interval: Duration,
    /// Upper bound on the total wait for one batch.
    pub max_wait: Duration,
    pub max_concurrent_uploads: usize,
    pub object_naming: ObjectNaming,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_wait: Duration::from_secs(DEFAULT_MAX_WAIT_SECS),
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
            object_naming: ObjectNaming::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Loads configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, AppError> {
        let get = |key: &str| lookup(vars, key);

        let bind_addr = get(ENV_BIND_ADDR)
            .unwrap_or(DEFAULT_BIND_ADDR)
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("{ENV_BIND_ADDR} is not a socket address: {e}")))?;

        let db_path = PathBuf::from(get(ENV_DB_PATH).unwrap_or(DEFAULT_DB_PATH));

        let poll_interval_secs =
            parse_number(get(ENV_POLL_INTERVAL_SECS), ENV_POLL_INTERVAL_SECS, DEFAULT_POLL_INTERVAL_SECS)?;
        let max_wait_secs = parse_number(get(ENV_MAX_WAIT_SECS), ENV_MAX_WAIT_SECS, DEFAULT_MAX_WAIT_SECS)?;
        let max_concurrent_uploads = parse_number(
            get(ENV_MAX_CONCURRENT_UPLOADS),
            ENV_MAX_CONCURRENT_UPLOADS,
            DEFAULT_MAX_CONCURRENT_UPLOADS,
        )?;

        if poll_interval_secs == 0 {
            return Err(AppError::Config(format!("{ENV_POLL_INTERVAL_SECS} must be at least 1")));
        }
        if max_wait_secs < poll_interval_secs {
            return Err(AppError::Config(format!(
                "{ENV_MAX_WAIT_SECS} must not be shorter than {ENV_POLL_INTERVAL_SECS}"
            )));
        }
        if max_concurrent_uploads == 0 {
            return Err(AppError::Config(format!("{ENV_MAX_CONCURRENT_UPLOADS} must be at least 1")));
        }

        let object_naming = match get(ENV_OBJECT_NAMING) {
            Some(raw) => ObjectNaming::from_str(raw).ok_or_else(|| {
                AppError::Config(format!(
                    "{ENV_OBJECT_NAMING} must be 'capitalize' or 'verbatim', got '{raw}'"
                ))
            })?,
            None => ObjectNaming::default(),
        };

        Ok(Self {
            bind_addr,
            db_path,
            poll_interval: Duration::from_secs(poll_interval_secs),
            max_wait: Duration::from_secs(max_wait_secs),
            max_concurrent_uploads,
            object_naming,
        })
    }
}

/// Returns the trimmed value for `key`, treating blank values as unset.
fn lookup<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(raw: Option<&str>, key: &str, default: T) -> Result<T, AppError> {
    match raw {
        Some(value) => value
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} must be a non-negative integer, got '{value}'"))),
        None => Ok(default),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
