use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::DEFAULT_TRIAL_HOURS;
use crate::package::DEFAULT_JPEG_QUALITY;
use crate::style::PromptDirectives;

const APP_DIR: &str = "photo-converter";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Persisted settings for photo-converter.
pub struct AppConfig {
    pub credentials_path: Option<PathBuf>,
    pub api_base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub jpeg_quality: u8,
    pub trial_hours: u32,
    pub require_login: bool,
    /// Optional clauses appended to style instructions.
    pub prompt: PromptDirectives,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            credentials_path: None,
            api_base_url: None,
            model: None,
            api_key: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            trial_hours: DEFAULT_TRIAL_HOURS,
            require_login: true,
            prompt: PromptDirectives::default(),
        }
    }
}

impl AppConfig {
    /// Returns the user config file path, if a config directory is available.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    /// Loads config from disk, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        toml::from_str(&contents).unwrap_or_else(|err| {
            warn!(path = %path.display(), %err, "ignoring malformed config");
            Self::default()
        })
    }

    /// Writes config to the user config path.
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = Self::config_path().context("no config directory on this platform")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let s = toml::to_string_pretty(self).context("failed to serialize config")?;
        std::fs::write(path, s).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Credential store location: the configured path, else `users.json`
    /// next to the config file.
    pub fn credentials_path(&self) -> PathBuf {
        if let Some(path) = &self.credentials_path {
            return path.clone();
        }
        dirs::config_dir()
            .map(|d| d.join(APP_DIR).join("users.json"))
            .unwrap_or_else(|| PathBuf::from("users.json"))
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }
}
