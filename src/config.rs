use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_content_path() -> PathBuf {
    PathBuf::from("topics.json")
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "models/gemini-2.0-flash".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ContentConfig {
    #[serde(default = "default_content_path")]
    pub path: PathBuf,
    /// List topics alphabetically instead of in file order.
    #[serde(default)]
    pub sort_topics: bool,
    /// Exit instead of showing the fallback notice when the topics file can't be loaded.
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChatConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Exit with status 1 when the API key is missing.
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for ContentConfig {
    fn default() -> Self {
        ContentConfig {
            path: default_content_path(),
            sort_topics: false,
            strict: false,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        ChatConfig {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            required: false,
            timeout_secs: None,
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 1000,
            height: 600,
            min_width: 640,
            min_height: 400,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&Self::get_config_path())
    }

    pub fn load_from(config_path: &Path) -> Self {
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            return Config::default();
        }

        match fs::read_to_string(config_path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => return config,
                Err(e) => tracing::warn!("Error parsing {}: {}. Using defaults.", config_path.display(), e),
            },
            Err(e) => tracing::warn!("Error reading {}: {}. Using defaults.", config_path.display(), e),
        }

        Config::default()
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/civic-edu")
        } else {
            PathBuf::from(".")
        }
    }
}
