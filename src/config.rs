//! Config module - Manages finvault configuration (finvault.toml).
//!
//! Configuration file contains:
//! - Application name (credential namespace and data folder name)
//! - Database file name
//! - Optional data folder override

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::platform::{InstallTarget, Platform};

/// Default application name.
pub const DEFAULT_APP_NAME: &str = "finvault";

/// Default database file name inside the app folder.
pub const DEFAULT_DB_FILE_NAME: &str = "finvault.db";

/// Main finvault configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Config version (for future migrations)
    #[serde(default = "default_version")]
    pub version: u32,

    /// Application name, used for the data folder and the keyring service
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Database file name
    #[serde(default = "default_db_file_name")]
    pub db_file_name: String,

    /// Replaces the platform data folder when set
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

fn default_version() -> u32 {
    1
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_db_file_name() -> String {
    DEFAULT_DB_FILE_NAME.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            app_name: default_app_name(),
            db_file_name: default_db_file_name(),
            data_dir: None,
        }
    }
}

/// Get default config directory (~/.config/finvault/).
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(DEFAULT_APP_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get default config file path.
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("finvault.toml")
}

impl Config {
    /// Load config from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Cannot parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from `path`, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).with_context(|| "Cannot serialize config to TOML")?;

        std::fs::write(path, content)
            .with_context(|| format!("Cannot write config file: {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Names must be single path components; they end up in file paths and keyring keys.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("app_name", &self.app_name), ("db_file_name", &self.db_file_name)] {
            if value.trim().is_empty() {
                anyhow::bail!("{} must not be empty", field);
            }
            if value.contains(['/', '\\']) || value == "." || value == ".." {
                anyhow::bail!("{} must be a plain name, got '{}'", field, value);
            }
        }
        Ok(())
    }

    /// Build the install target for `platform`.
    pub fn install_target(&self, platform: Platform) -> InstallTarget {
        InstallTarget::new(platform, &self.app_name, &self.db_file_name)
    }
}
