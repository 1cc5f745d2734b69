use crate::core::db::DbParams;
use crate::core::Result;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub profiler: Option<ProfilerConfig>,
}

/// Connection-related configuration.
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    pub dsn: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connection_charset: Option<String>,
    /// Seconds a shared connection may live before it is reopened
    pub max_lifetime_secs: Option<u64>,
}

/// Profiler configuration.
#[derive(Debug, Deserialize)]
pub struct ProfilerConfig {
    pub enabled: Option<bool>,
}

impl ConnectionConfig {
    pub fn db_params(&self) -> DbParams {
        DbParams {
            dsn: self.dsn.clone(),
            username: self.username.clone().unwrap_or_default(),
            password: self.password.clone().unwrap_or_default(),
            connection_charset: self.connection_charset.clone(),
        }
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_secs.map(Duration::from_secs)
    }
}

impl Config {
    pub fn profiling_enabled(&self) -> bool {
        self.profiler
            .as_ref()
            .and_then(|p| p.enabled)
            .unwrap_or(false)
    }
}

/// Default location of the configuration file, `<config dir>/dbkit/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dbkit").join("config.toml"))
}

/// Parses configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

/// Loads configuration from a TOML file at the given path.
///
/// # Arguments
///
/// * `path` - The file path to the TOML configuration file.
///
/// # Example
///
/// ```no_run
/// let config = dbkit::config::load_config("config.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}
