use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{CocalcError, Result};

pub const DEFAULT_BASE_URL: &str = "https://cocalc.com";

/// Account settings for the platform, read from a YAML file of the form
///
/// ```yaml
/// first_name: Jane
/// last_name: Dunne
/// api_key: an_api_key
/// email: jane.dunne@yourmail.com
/// ```
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub api_key: Option<String>,
    #[serde(default)]
    pub email: String,
    pub base_url: Option<String>,
}

impl UserConfig {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing file at the default location yields an empty config so
    /// that the environment alone can supply the API key.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::config_path()?;
                if !path.exists() {
                    return Ok(UserConfig::default());
                }
                Self::load_from(&path)
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        read_yaml(path)
    }

    pub fn config_path() -> Result<PathBuf> {
        ProjectDirs::from("", "", "cocalc")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
            .ok_or(CocalcError::NoConfigDir)
    }

    /// Get API key with env var taking precedence over config file
    pub fn api_key(&self) -> Result<String> {
        if let Ok(key) = std::env::var("COCALC_API_KEY") {
            return Ok(key);
        }

        self.api_key.clone().ok_or(CocalcError::MissingApiKey)
    }

    pub fn base_url(&self) -> String {
        std::env::var("COCALC_BASE_URL")
            .ok()
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
    }

    /// Name used as the invitation "reply to" name.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Read and deserialize a YAML file, keeping the path in any error.
pub fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path).map_err(|e| CocalcError::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_yaml::from_str(&contents).map_err(|e| CocalcError::ConfigParse {
        path: path.to_path_buf(),
        source: e,
    })
}
