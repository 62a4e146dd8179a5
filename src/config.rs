use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::client::{DEFAULT_ENDPOINT, DEFAULT_MODEL};
use crate::error::{ChatError, Result};

pub const DEFAULT_DEVELOPER_MESSAGE: &str = "You are a helpful AI assistant.";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub developer_message: Option<String>,
    pub api_key: Option<String>,
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub developer_message: Option<String>,
    pub api_key: Option<String>,
}

/// Fully resolved settings for a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub endpoint: String,
    pub model: String,
    pub developer_message: String,
    pub api_key: String,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    /// Later sources win: built-in default, then config file, then overrides
    pub fn resolve(&self, overrides: &Overrides) -> Settings {
        fn pick(over: &Option<String>, file: &Option<String>, default: &str) -> String {
            over.clone()
                .or_else(|| file.clone())
                .unwrap_or_else(|| default.to_string())
        }

        Settings {
            endpoint: pick(&overrides.endpoint, &self.endpoint, DEFAULT_ENDPOINT),
            model: pick(&overrides.model, &self.model, DEFAULT_MODEL),
            developer_message: pick(
                &overrides.developer_message,
                &self.developer_message,
                DEFAULT_DEVELOPER_MESSAGE,
            ),
            api_key: pick(&overrides.api_key, &self.api_key, ""),
        }
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ChatError::Config("Could not determine config directory".to_string()))?;

        Ok(config_dir.join("streamchat"))
    }

    pub fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }
}

/// Show only the last four characters of a credential
pub fn mask_key(key: &str) -> String {
    let len = key.chars().count();
    if len == 0 {
        String::new()
    } else if len <= 4 {
        "*".repeat(len)
    } else {
        let masked_len = len - 4;
        let last_four: String = key.chars().skip(masked_len).collect();
        format!("{}...{}", "*".repeat(masked_len.min(20)), last_four)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = Config {
            endpoint: Some("http://localhost:9000/api/chat".to_string()),
            model: Some("gpt-4o".to_string()),
            developer_message: None,
            api_key: None,
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ChatError::Json(_))));
    }

    #[test]
    fn resolve_prefers_overrides_then_file_then_defaults() {
        let config = Config {
            endpoint: Some("http://file/api/chat".to_string()),
            model: Some("file-model".to_string()),
            developer_message: None,
            api_key: Some("sk-file".to_string()),
        };
        let overrides = Overrides {
            model: Some("flag-model".to_string()),
            ..Overrides::default()
        };

        let settings = config.resolve(&overrides);
        assert_eq!(settings.endpoint, "http://file/api/chat");
        assert_eq!(settings.model, "flag-model");
        assert_eq!(settings.developer_message, DEFAULT_DEVELOPER_MESSAGE);
        assert_eq!(settings.api_key, "sk-file");
    }

    #[test]
    fn resolve_defaults_without_any_source() {
        let settings = Config::new().resolve(&Overrides::default());
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert!(settings.api_key.is_empty());
    }

    #[test]
    fn mask_key_shows_last_four() {
        assert_eq!(mask_key(""), "");
        assert_eq!(mask_key("abc"), "***");
        assert_eq!(mask_key("sk-123456"), "*****...3456");
    }
}
