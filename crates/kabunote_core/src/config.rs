//! Environment-driven runtime settings.
//!
//! # Responsibility
//! - Resolve the deployment environment (`development`, `testing`, `production`).
//! - Derive database, logging and bind settings with per-environment defaults.
//!
//! # Invariants
//! - Production never falls back to an implicit database path or stderr logging.
//! - Testing always uses an in-memory database unless a path is given explicitly.

use crate::logging::{default_log_level, normalize_level};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_VAR: &str = "KABUNOTE_ENV";
pub const DB_PATH_VAR: &str = "KABUNOTE_DB_PATH";
pub const LOG_LEVEL_VAR: &str = "KABUNOTE_LOG_LEVEL";
pub const LOG_DIR_VAR: &str = "KABUNOTE_LOG_DIR";
pub const BIND_VAR: &str = "KABUNOTE_BIND";
pub const SESSION_DAYS_VAR: &str = "KABUNOTE_SESSION_DAYS";

const DEV_DB_FILE: &str = "kabunote_dev.sqlite3";
const DEFAULT_SESSION_DAYS: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "testing" | "test" => Some(Self::Testing),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Production => "production",
        }
    }
}

/// Storage location chosen for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseLocation {
    File(PathBuf),
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    UnknownEnvironment(String),
    Missing {
        environment: Environment,
        variable: &'static str,
    },
    Invalid {
        variable: &'static str,
        message: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownEnvironment(value) => write!(
                f,
                "unknown environment `{value}`; expected development|testing|production"
            ),
            Self::Missing {
                environment,
                variable,
            } => write!(f, "{variable} must be set in {}", environment.as_str()),
            Self::Invalid { variable, message } => write!(f, "invalid {variable}: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Resolved runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub environment: Environment,
    pub database: DatabaseLocation,
    pub log_level: &'static str,
    /// `None` logs to stderr.
    pub log_dir: Option<String>,
    pub bind_addr: String,
    pub session_days: u32,
}

impl Settings {
    /// Resolves settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Resolves settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let environment = match get(ENV_VAR) {
            Some(value) => {
                Environment::parse(&value).ok_or(ConfigError::UnknownEnvironment(value))?
            }
            None => Environment::Development,
        };

        let database = match (get(DB_PATH_VAR), environment) {
            (Some(path), _) if path == ":memory:" => DatabaseLocation::Memory,
            (Some(path), _) => DatabaseLocation::File(PathBuf::from(path)),
            (None, Environment::Development) => DatabaseLocation::File(PathBuf::from(DEV_DB_FILE)),
            (None, Environment::Testing) => DatabaseLocation::Memory,
            (None, Environment::Production) => {
                return Err(ConfigError::Missing {
                    environment,
                    variable: DB_PATH_VAR,
                })
            }
        };

        let log_level = match get(LOG_LEVEL_VAR) {
            Some(value) => normalize_level(&value).map_err(|message| ConfigError::Invalid {
                variable: LOG_LEVEL_VAR,
                message,
            })?,
            None => match environment {
                Environment::Development => default_log_level(),
                Environment::Testing => "warn",
                Environment::Production => "info",
            },
        };

        let log_dir = get(LOG_DIR_VAR);
        if log_dir.is_none() && environment == Environment::Production {
            return Err(ConfigError::Missing {
                environment,
                variable: LOG_DIR_VAR,
            });
        }

        let bind_addr = get(BIND_VAR).unwrap_or_else(|| {
            match environment {
                Environment::Development => "127.0.0.1:8000",
                Environment::Testing => "127.0.0.1:0",
                Environment::Production => "0.0.0.0:8000",
            }
            .to_string()
        });

        let session_days = match get(SESSION_DAYS_VAR) {
            Some(value) => match value.parse::<u32>() {
                Ok(days) if days > 0 => days,
                _ => {
                    return Err(ConfigError::Invalid {
                        variable: SESSION_DAYS_VAR,
                        message: format!("expected a positive integer, got `{value}`"),
                    })
                }
            },
            None => DEFAULT_SESSION_DAYS,
        };

        Ok(Self {
            environment,
            database,
            log_level,
            log_dir,
            bind_addr,
            session_days,
        })
    }

    /// Opens the configured database and applies migrations.
    pub fn open_database(&self) -> crate::db::DbResult<rusqlite::Connection> {
        match &self.database {
            DatabaseLocation::File(path) => crate::db::open_db(path),
            DatabaseLocation::Memory => crate::db::open_db_in_memory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, DatabaseLocation, Environment, Settings};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn settings_from(pairs: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn development_defaults_to_local_file_and_stderr() {
        let settings = settings_from(&[]).unwrap();
        assert_eq!(settings.environment, Environment::Development);
        assert_eq!(
            settings.database,
            DatabaseLocation::File(PathBuf::from("kabunote_dev.sqlite3"))
        );
        assert_eq!(settings.log_dir, None);
        assert_eq!(settings.bind_addr, "127.0.0.1:8000");
        assert_eq!(settings.session_days, 14);
    }

    #[test]
    fn testing_uses_memory_and_quiet_logs() {
        let settings = settings_from(&[("KABUNOTE_ENV", "testing")]).unwrap();
        assert_eq!(settings.database, DatabaseLocation::Memory);
        assert_eq!(settings.log_level, "warn");
    }

    #[test]
    fn production_requires_explicit_paths() {
        let err = settings_from(&[("KABUNOTE_ENV", "production")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing {
                variable: "KABUNOTE_DB_PATH",
                ..
            }
        ));

        let err = settings_from(&[
            ("KABUNOTE_ENV", "prod"),
            ("KABUNOTE_DB_PATH", "/var/lib/kabunote/db.sqlite3"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Missing {
                variable: "KABUNOTE_LOG_DIR",
                ..
            }
        ));
    }

    #[test]
    fn invalid_values_are_reported() {
        assert!(matches!(
            settings_from(&[("KABUNOTE_ENV", "staging")]).unwrap_err(),
            ConfigError::UnknownEnvironment(_)
        ));
        assert!(matches!(
            settings_from(&[("KABUNOTE_LOG_LEVEL", "loud")]).unwrap_err(),
            ConfigError::Invalid { .. }
        ));
        assert!(matches!(
            settings_from(&[("KABUNOTE_SESSION_DAYS", "0")]).unwrap_err(),
            ConfigError::Invalid { .. }
        ));
    }
}
