//! Platform detection and per-OS application-data folders.
//!
//! - Windows: `%APPDATA%\<app>`
//! - macOS: `~/Library/Application Support/<app>`
//! - Linux: `$XDG_DATA_HOME/<app>` (default `~/.local/share/<app>`)

use crate::error::{BootstrapError, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Operating systems with a known data-directory convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    /// Platform of the running process.
    pub fn detect() -> Result<Self> {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an OS identifier (as in `std::env::consts::OS`).
    pub fn from_os(os: &str) -> Result<Self> {
        match os {
            "windows" => Ok(Self::Windows),
            "macos" => Ok(Self::MacOs),
            "linux" => Ok(Self::Linux),
            other => Err(BootstrapError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// Conventional per-user data directory for this platform.
    pub fn data_root(&self, roots: &DataRoots) -> PathBuf {
        match self {
            Self::Windows => roots
                .appdata
                .clone()
                .unwrap_or_else(|| roots.home.join("AppData").join("Roaming")),
            Self::MacOs => roots.home.join("Library").join("Application Support"),
            Self::Linux => roots
                .xdg_data_home
                .clone()
                .unwrap_or_else(|| roots.home.join(".local").join("share")),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Windows => "windows",
            Self::MacOs => "macos",
            Self::Linux => "linux",
        };
        f.write_str(name)
    }
}

/// Environment-derived base directories.
#[derive(Debug, Clone)]
pub struct DataRoots {
    pub home: PathBuf,
    pub appdata: Option<PathBuf>,
    pub xdg_data_home: Option<PathBuf>,
}

impl DataRoots {
    /// Roots rooted at an explicit home directory, ignoring the environment.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            appdata: None,
            xdg_data_home: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        let home = dirs::home_dir().ok_or(BootstrapError::NoHomeDirectory)?;
        Ok(Self {
            home,
            appdata: non_empty_env("APPDATA"),
            xdg_data_home: non_empty_env("XDG_DATA_HOME"),
        })
    }
}

fn non_empty_env(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// What gets installed where. Immutable for a given deployment.
#[derive(Debug, Clone)]
pub struct InstallTarget {
    pub platform: Platform,
    pub app_name: String,
    pub db_file_name: String,
}

impl InstallTarget {
    pub fn new(
        platform: Platform,
        app_name: impl Into<String>,
        db_file_name: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            app_name: app_name.into(),
            db_file_name: db_file_name.into(),
        }
    }

    pub fn app_folder(&self, roots: &DataRoots) -> PathBuf {
        self.platform.data_root(roots).join(&self.app_name)
    }

    pub fn db_path(&self, app_folder: &Path) -> PathBuf {
        app_folder.join(&self.db_file_name)
    }
}

/// Create `folder` (and parents) if needed.
pub fn ensure_folder(folder: &Path) -> Result<()> {
    std::fs::create_dir_all(folder).map_err(|e| BootstrapError::io(folder, e))
}
