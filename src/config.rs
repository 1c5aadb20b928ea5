//! Application configuration module
//!
//! Settings are persisted with `confy` in the OS-specific config directory.
//! The revision store lives under the platform data directory unless the
//! settings point it somewhere else.

use crate::constant::{
    APP_NAME, APP_ORGANIZATION, APP_QUALIFIER, DEFAULT_BACKGROUND_DIFF_THRESHOLD,
};
use crate::history::filter::HistoryFilter;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Confy(#[from] confy::ConfyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Config {
    pub settings: Settings,
    /// Explicit settings file; `None` uses the confy default location
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from disk, creating default if it doesn't exist
    pub fn load() -> Result<Self, ConfigError> {
        let settings: Settings = confy::load(APP_NAME, None)?;
        let config = Self {
            settings,
            path: None,
        };
        info!("Load config from {:?}", config.config_path()?);
        Ok(config)
    }

    /// Load configuration from a specific file, creating it if missing
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let settings: Settings = confy::load_path(&path)?;
        info!("Load config from {:?}", path);
        Ok(Self {
            settings,
            path: Some(path),
        })
    }

    /// Save current configuration to disk
    pub fn save(&self) -> Result<(), ConfigError> {
        match &self.path {
            Some(path) => confy::store_path(path, &self.settings)?,
            None => confy::store(APP_NAME, None, &self.settings)?,
        }
        info!("Save config to {:?}", self.config_path()?);
        Ok(())
    }

    /// Get the application data directory
    /// Falls back to a local "data" directory if platform dirs are unavailable
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.settings.data_dir {
            return dir.clone();
        }

        if let Some(proj_dirs) = ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME) {
            proj_dirs.data_dir().to_path_buf()
        } else {
            PathBuf::from("data")
        }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(confy::get_configuration_file_path(APP_NAME, None)?),
        }
    }

    /// Replace the history filter and persist it. Stored synchronously so a
    /// short-lived process does not exit before the write lands.
    pub fn set_filter(&mut self, filter: HistoryFilter) -> Result<(), ConfigError> {
        self.settings.filter = filter;
        self.save()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Falling back to default settings: {}", e);
            Self {
                settings: Settings::default(),
                path: None,
            }
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Group revisions into Today / Yesterday / This Month / Previous
    #[serde(default = "default_group_by_date")]
    pub group_by_date: bool,

    /// Number of compared nodes above which a diff runs off the calling thread
    #[serde(default = "default_background_diff_threshold")]
    pub background_diff_threshold: usize,

    /// Override for the revision store location
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Filter applied to every refresh
    #[serde(default)]
    pub filter: HistoryFilter,
}

fn default_group_by_date() -> bool {
    true
}

fn default_background_diff_threshold() -> usize {
    DEFAULT_BACKGROUND_DIFF_THRESHOLD
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            group_by_date: default_group_by_date(),
            background_diff_threshold: default_background_diff_threshold(),
            data_dir: None,
            filter: HistoryFilter::default(),
        }
    }
}
