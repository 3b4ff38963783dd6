//! Session settings
//!
//! Optional TOML settings file with defaults for everything; CLI flags
//! override whatever is loaded here.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings-file errors
#[derive(Error, Debug)]
pub enum SettingsError {
    /// An explicitly requested settings file does not exist
    #[error("settings file not found: {0}")]
    NotFound(PathBuf),

    /// Settings file could not be read
    #[error("failed to read settings: {0}")]
    Read(#[from] std::io::Error),

    /// TOML parse error
    #[error("invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Tunable session defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Namespace the jump pod lives in
    pub namespace: String,
    /// Container image for the jump pod
    pub image: String,
    /// Local port the relay binds
    pub local_port: u16,
    /// Readiness wait timeout, kubectl duration syntax
    pub ready_timeout: String,
    /// Container name for `kubectl cp`, if the manifest has more than one
    pub container: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            image: "docker.io/rastasheep/ubuntu-sshd:18.04".to_string(),
            local_port: 2222,
            ready_timeout: "90s".to_string(),
            container: None,
        }
    }
}

/// Default settings file location (`<config dir>/kjump/config.toml`).
pub fn default_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kjump")
        .join("config.toml")
}

impl Settings {
    /// Load settings. An explicit path must exist; the default path is
    /// allowed to be absent, in which case defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_settings_path(), false),
        };
        if !path.exists() {
            if required {
                return Err(SettingsError::NotFound(path));
            }
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }
}
