//! TOML configuration for embedding applications and the bundled tools.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::BackendOptions;
use crate::session::SessionOptions;

/// Page size used when the configuration does not name one.
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Engine settings as stored on disk.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rows per window.
    pub page_size: usize,
    /// Session defaults, including backend tuning.
    pub session: SessionOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            session: SessionOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Loads `explicit`, or the default location when `None`. A missing
    /// file yields the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        match explicit.or_else(default_config_path) {
            Some(path) if path.exists() => Self::read(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Reads and parses one file.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.page_size == 0 {
            return Err(ConfigError::InvalidPageSize {
                path: path.to_path_buf(),
            });
        }
        Ok(config)
    }

    /// Writes the configuration to `path`, or the default location.
    pub fn persist(&self, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let target = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path().ok_or(ConfigError::NoConfigPath)?,
        };
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let serialized =
            toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })?;
        fs::write(&target, serialized).map_err(|source| ConfigError::Write {
            path: target.clone(),
            source,
        })?;
        Ok(target)
    }

    /// Backend options carried by the session section.
    pub fn backend(&self) -> &BackendOptions {
        &self.session.backend
    }
}

/// Errors raised while loading or saving an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Parser error.
        source: toml::de::Error,
    },
    /// The page size was zero.
    #[error("config {path}: page_size must be at least 1")]
    InvalidPageSize {
        /// Config file path.
        path: PathBuf,
    },
    /// Serialization failed.
    #[error("failed to serialize config: {source}")]
    Serialize {
        /// Serializer error.
        source: toml::ser::Error,
    },
    /// Writing the file failed.
    #[error("failed to write config {path}: {source}")]
    Write {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Creating the parent directory failed.
    #[error("failed to create config directory {path}: {source}")]
    CreateDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// No explicit path and no per-user config directory.
    #[error("no config directory found; pass an explicit config path")]
    NoConfigPath,
}

/// `<config dir>/tablecraft/seek.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("tablecraft").join("seek.toml"))
}
