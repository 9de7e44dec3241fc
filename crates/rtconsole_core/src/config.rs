//! Console configuration file.
//!
//! # Invariants
//! - A config returned by [`ConsoleConfig::load`] has passed `validate`.

use crate::logging::{default_log_level, init_logging, LoggingError};
use crate::supervisor::SupervisorCategory;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleConfig {
    pub log_level: String,
    pub log_dir: PathBuf,
    pub feature_db_path: PathBuf,
    /// Snapshot file served when the snapshot category is active.
    pub snapshot_path: Option<PathBuf>,
    /// Category activated at startup.
    pub default_category: SupervisorCategory,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("rtconsole");
        Self {
            log_level: default_log_level().to_string(),
            log_dir: base.join("logs"),
            feature_db_path: base.join("features.sqlite3"),
            snapshot_path: None,
            default_category: SupervisorCategory::LiveRpc,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "cannot parse config `{}`: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

impl ConsoleConfig {
    /// Reads a JSON config; absent keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_absolute("log_dir", &self.log_dir)?;
        require_absolute("feature_db_path", &self.feature_db_path)?;
        if let Some(snapshot) = &self.snapshot_path {
            require_absolute("snapshot_path", snapshot)?;
        }
        Ok(())
    }

    /// Starts logging with this config's level and directory.
    pub fn init_logging(&self) -> Result<(), LoggingError> {
        let log_dir = self.log_dir.to_str().ok_or_else(|| {
            LoggingError::InvalidDirectory(format!(
                "log_dir `{}` is not valid UTF-8",
                self.log_dir.display()
            ))
        })?;
        init_logging(&self.log_level, log_dir)
    }
}

fn require_absolute(field: &str, path: &Path) -> Result<(), ConfigError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{field} must be an absolute path, got `{}`",
            path.display()
        )))
    }
}
