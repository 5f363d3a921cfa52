//! Configuration for labroster
//!
//! Directory layout for the upload workspace, the archive store and the
//! generated-config store, plus the fixed expected upload names.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Expected name of the group config upload (slot `file1`).
pub const GROUP_CONFIG_NAME: &str = "group_config.xml";

/// Expected name of the thumbnail settings upload (slot `file2`).
pub const THUMBNAIL_SETTINGS_NAME: &str = "thumbnail_settings.xml";

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_upload_dir() -> PathBuf {
    default_data_dir().join("uploads")
}

fn default_archive_dir() -> PathBuf {
    default_data_dir().join("archives")
}

fn default_versions_dir() -> PathBuf {
    default_data_dir().join("new_configs")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace holding the current uploads being edited
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Archive store for uploaded source bundles
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,

    /// Store for generated config bundles
    #[serde(default = "default_versions_dir")]
    pub versions_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            archive_dir: default_archive_dir(),
            versions_dir: default_versions_dir(),
        }
    }
}

impl Config {
    /// Root all three directories under one data directory.
    pub fn under<P: AsRef<Path>>(data_dir: P) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            upload_dir: data_dir.join("uploads"),
            archive_dir: data_dir.join("archives"),
            versions_dir: data_dir.join("new_configs"),
        }
    }

    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Current group config in the upload workspace
    pub fn group_config_path(&self) -> PathBuf {
        self.upload_dir.join(GROUP_CONFIG_NAME)
    }

    /// Current thumbnail settings in the upload workspace
    pub fn thumbnail_settings_path(&self) -> PathBuf {
        self.upload_dir.join(THUMBNAIL_SETTINGS_NAME)
    }

    /// Staging area for rewriter output awaiting publish
    pub fn staging_dir(&self) -> PathBuf {
        self.versions_dir.join("staging")
    }
}
