//! Application-level configuration
//!
//! Database location, model provider, HTTP server, chat context sizing and
//! logging, loaded from TOML with `AIMI_*` environment overrides.

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Embedded default configuration file
const DEFAULT_CONFIG: &str = include_str!("../../aimi.config.toml");

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "aimi.config.toml";

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "AIMI_CONFIG_PATH";

const KNOWN_PROVIDERS: [&str; 2] = ["mock", "openai"];
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load from `./aimi.config.toml`, then `~/.aimi/aimi.config.toml`, then
    /// the file named by `AIMI_CONFIG_PATH`, falling back to the embedded
    /// defaults.
    pub fn load() -> Result<Self> {
        if let Ok(content) = std::fs::read_to_string(CONFIG_FILE_NAME) {
            return Self::parse(&content, Path::new(CONFIG_FILE_NAME));
        }

        if let Some(base_dirs) = BaseDirs::new() {
            let home_config = base_dirs.home_dir().join(".aimi").join(CONFIG_FILE_NAME);
            if let Ok(content) = std::fs::read_to_string(&home_config) {
                return Self::parse(&content, &home_config);
            }
        }

        if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(&config_path);
            let content = std::fs::read_to_string(&path)
                .context(format!("Failed to read config file {}", path.display()))?;
            return Self::parse(&content, &path);
        }

        Self::embedded_default()
    }

    /// Load a specific file. A missing file is created with the default
    /// settings first.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                eprintln!(
                    "Configuration file not found at {}. Creating with default settings...",
                    path.display()
                );

                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)
                            .context(format!("Failed to create directory {}", parent.display()))?;
                    }
                }

                std::fs::write(path, DEFAULT_CONFIG).context(format!(
                    "Failed to create config file at {}",
                    path.display()
                ))?;

                Self::embedded_default()
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            )),
        }
    }

    pub fn embedded_default() -> Result<Self> {
        toml::from_str(DEFAULT_CONFIG)
            .map_err(|e| anyhow::anyhow!("Failed to parse embedded default config: {}", e))
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {}", path.display(), e))
    }

    pub fn validate(&self) -> Result<()> {
        let provider = self.model.provider.to_lowercase();
        if provider.is_empty() {
            return Err(anyhow::anyhow!("Model provider cannot be empty"));
        }
        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid model provider: {}",
                self.model.provider
            ));
        }

        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(anyhow::anyhow!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.model.temperature
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!("Invalid log level: {}", self.logging.level));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }

        if self.chat.context_message_limit == 0 {
            return Err(anyhow::anyhow!("context_message_limit must be at least 1"));
        }
        if self.chat.cache_size < self.chat.context_message_limit {
            return Err(anyhow::anyhow!(
                "cache_size ({}) must be at least context_message_limit ({})",
                self.chat.cache_size,
                self.chat.context_message_limit
            ));
        }

        Ok(())
    }

    /// Apply `AIMI_*` environment variables. Unparseable numbers are ignored.
    pub fn apply_env_overrides(&mut self) {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }

        if let Some(provider) = var("AIMI_PROVIDER") {
            self.model.provider = provider;
        }
        if let Some(model_name) = var("AIMI_MODEL") {
            self.model.model_name = Some(model_name);
        }
        if let Some(api_key_source) = var("AIMI_API_KEY_SOURCE") {
            self.model.api_key_source = Some(api_key_source);
        }
        if let Some(base_url) = var("AIMI_BASE_URL") {
            self.model.base_url = Some(base_url);
        }
        if let Some(temp) = var("AIMI_TEMPERATURE").and_then(|t| t.parse::<f32>().ok()) {
            self.model.temperature = temp;
        }
        if let Some(level) = var("AIMI_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(db_path) = var("AIMI_DB_PATH") {
            self.database.path = PathBuf::from(db_path);
        }
        if let Some(host) = var("AIMI_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("AIMI_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.server.port = port;
        }
        if let Some(limit) = var("AIMI_CONTEXT_MESSAGE_LIMIT").and_then(|l| l.parse::<usize>().ok())
        {
            self.chat.context_message_limit = limit;
        }
    }

    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str("Configuration loaded:\n");
        summary.push_str(&format!("Database: {}\n", self.database.path.display()));
        summary.push_str(&format!("Model Provider: {}\n", self.model.provider));
        if let Some(model) = &self.model.model_name {
            summary.push_str(&format!("Model Name: {}\n", model));
        }
        if let Some(base_url) = &self.model.base_url {
            summary.push_str(&format!("Base URL: {}\n", base_url));
        }
        summary.push_str(&format!("Temperature: {}\n", self.model.temperature));
        summary.push_str(&format!(
            "Server: {}:{} (CORS {})\n",
            self.server.host,
            self.server.port,
            if self.server.enable_cors { "on" } else { "off" }
        ));
        summary.push_str(&format!(
            "Context Messages: {}\n",
            self.chat.context_message_limit
        ));
        summary.push_str(&format!("Logging Level: {}\n", self.logging.level));
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("aimi.duckdb"),
        }
    }
}

/// Model provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// "openai" or "mock"
    pub provider: String,
    #[serde(default)]
    pub model_name: Option<String>,
    /// `env:VAR`, `file:PATH`, or the key itself
    #[serde(default)]
    pub api_key_source: Option<String>,
    /// OpenAI-compatible endpoint override
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.7
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model_name: None,
            api_key_source: None,
            base_url: None,
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_enable_cors() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            enable_cors: default_enable_cors(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Most recent messages sent to the model per turn
    #[serde(default = "default_context_message_limit")]
    pub context_message_limit: usize,
    /// Messages kept in memory per chat
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

fn default_context_message_limit() -> usize {
    20
}

fn default_cache_size() -> usize {
    100
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            context_message_limit: default_context_message_limit(),
            cache_size: default_cache_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_default_is_valid() {
        let config = AppConfig::embedded_default().unwrap();
        config.validate().unwrap();
        assert_eq!(config.model.provider, "mock");
        assert_eq!(config.chat.context_message_limit, 20);
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: AppConfig = toml::from_str("[model]\nprovider = \"openai\"\n").unwrap();
        assert_eq!(config.model.temperature, 0.7);
        assert_eq!(config.chat, ChatConfig::default());
        assert_eq!(config.database.path, PathBuf::from("aimi.duckdb"));
    }

    #[test]
    fn cache_smaller_than_context_is_rejected() {
        let mut config = AppConfig::default();
        config.chat.cache_size = 5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache_size"));
    }
}
