//! Configuration management with YAML support

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{Error, Result};

/// Models offered by the settings command; others are accepted with a warning
pub const KNOWN_MODELS: &[&str] = &["gpt-4o", "gpt-4o-mini", "o1", "o1-mini"];

pub const MIN_HISTORY_ITEMS: usize = 10;
pub const MAX_HISTORY_ITEMS: usize = 1000;

/// Flat application settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_model_name")]
    pub model_name: String,

    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Upper bound on rows requested when showing history
    #[serde(default = "default_max_history_items")]
    pub max_history_items: usize,

    /// Name of the context used when none is chosen explicitly (empty = none)
    #[serde(default)]
    pub default_context: String,

    #[serde(default)]
    pub openai_api_key: String,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

// Default value functions
fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}

fn default_database_path() -> String {
    "~/.local/share/toolbar-chat/chat_history.db".to_string()
}

fn default_max_history_items() -> usize {
    100
}

fn default_api_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_name: default_model_name(),
            database_path: default_database_path(),
            max_history_items: default_max_history_items(),
            default_context: String::new(),
            openai_api_key: String::new(),
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    /// Searches in order:
    /// 1. Provided path
    /// 2. ./toolbar-chat.yaml (current directory)
    /// 3. ~/.config/toolbar-chat/config.yaml
    pub fn load(path: &str) -> Result<Self> {
        let search_paths = vec![
            shellexpand::tilde(path).to_string(),
            "toolbar-chat.yaml".to_string(),
            Self::default_path().to_string_lossy().to_string(),
        ];

        for search_path in &search_paths {
            if Path::new(search_path).exists() {
                return Self::load_file(Path::new(search_path));
            }
        }

        // No config file found, use defaults
        Ok(Config::default())
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Write the configuration as YAML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Config(format!("failed to create {}: {}", parent.display(), e))
                })?;
            }
        }

        let yaml = serde_yaml::to_string(self)
            .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, yaml)
            .map_err(|e| Error::Config(format!("failed to write {}: {}", path.display(), e)))
    }

    /// ~/.config/toolbar-chat/config.yaml
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".config/toolbar-chat/config.yaml")
    }

    /// Get the database path, expanding ~ to home directory
    pub fn database_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.database_path).to_string();
        PathBuf::from(expanded)
    }

    /// The configured key, or `OPENAI_API_KEY` when the file leaves it empty
    pub fn api_key(&self) -> String {
        if self.openai_api_key.trim().is_empty() {
            std::env::var("OPENAI_API_KEY").unwrap_or_default()
        } else {
            self.openai_api_key.clone()
        }
    }

    /// The default context name, if one is set
    pub fn default_context(&self) -> Option<&str> {
        let name = self.default_context.trim();
        if name.is_empty() {
            None
        } else {
            Some(name)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(Error::Config("model_name must not be empty".to_string()));
        }

        if !(MIN_HISTORY_ITEMS..=MAX_HISTORY_ITEMS).contains(&self.max_history_items) {
            return Err(Error::Config(format!(
                "max_history_items must be between {} and {}",
                MIN_HISTORY_ITEMS, MAX_HISTORY_ITEMS
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if !KNOWN_MODELS.contains(&self.model_name.as_str()) {
            warn!("Model '{}' is not in the known model list", self.model_name);
        }

        Ok(())
    }

    /// Update one setting by its command-line key. Leaves `self` untouched
    /// when the new value does not validate.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        match key {
            "model" | "model_name" => updated.model_name = value.to_string(),
            "max-history" | "max_history_items" => {
                updated.max_history_items = value.parse().map_err(|_| {
                    Error::Config(format!("invalid history limit '{}'", value))
                })?;
            }
            "default-context" | "default_context" => updated.default_context = value.to_string(),
            "api-url" | "api_url" => updated.api_url = value.to_string(),
            "api-key" | "openai_api_key" => updated.openai_api_key = value.to_string(),
            "timeout" | "request_timeout_secs" => {
                updated.request_timeout_secs = value
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid timeout '{}'", value)))?;
            }
            other => return Err(Error::Config(format!("unknown setting '{}'", other))),
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}
