//! Client Factory
//!
//! Creates LLM clients based on configuration.

use crate::agent::model::{LlmClient, ProviderKind};
use crate::agent::providers::MockLlmClient;
#[cfg(feature = "openai")]
use crate::agent::providers::OpenAiClient;
use crate::config::ModelConfig;
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tracing::info;

/// Create an LLM client from configuration
pub fn create_client(config: &ModelConfig) -> Result<Arc<dyn LlmClient>> {
    let provider_kind = ProviderKind::from_str(&config.provider)
        .ok_or_else(|| anyhow!("Unknown provider: {}", config.provider))?;

    let client: Arc<dyn LlmClient> = match provider_kind {
        ProviderKind::Mock => {
            let client = match &config.model_name {
                Some(model_name) => MockLlmClient::default().with_model_name(model_name.clone()),
                None => MockLlmClient::default(),
            };
            Arc::new(client)
        }

        #[cfg(feature = "openai")]
        ProviderKind::OpenAI => {
            let api_key = match &config.api_key_source {
                Some(source) => resolve_api_key(source)?,
                None => load_api_key_from_env("OPENAI_API_KEY")?,
            };

            let mut client = match &config.base_url {
                Some(base_url) => OpenAiClient::with_base_url(api_key, base_url.clone()),
                None => OpenAiClient::with_api_key(api_key),
            };
            if let Some(model_name) = &config.model_name {
                client = client.with_model(model_name.clone());
            }
            Arc::new(client.with_temperature(config.temperature))
        }
    };

    info!(
        provider = provider_kind.as_str(),
        model = client.model_name(),
        "LLM client ready"
    );
    Ok(client)
}

/// Resolve API key from a source string
///
/// Supports the following formats:
/// - `env:VAR_NAME` - Load from environment variable
/// - `file:PATH` - Load from file
/// - Any other string - Use as-is (direct API key)
pub fn resolve_api_key(source: &str) -> Result<String> {
    if let Some(env_var) = source.strip_prefix("env:") {
        load_api_key_from_env(env_var)
    } else if let Some(path) = source.strip_prefix("file:") {
        load_api_key_from_file(path)
    } else {
        Ok(source.to_string())
    }
}

pub fn load_api_key_from_env(env_var: &str) -> Result<String> {
    std::env::var(env_var).context(format!("Environment variable {} not set", env_var))
}

/// Reads and trims a key file. A leading `~/` expands to the home directory.
pub fn load_api_key_from_file(path: &str) -> Result<String> {
    let expanded_path = match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(stripped), Some(home)) => std::path::PathBuf::from(home).join(stripped),
        _ => std::path::PathBuf::from(path),
    };

    std::fs::read_to_string(&expanded_path)
        .context(format!("Failed to read API key from file: {}", path))
        .map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn model_config(provider: &str) -> ModelConfig {
        ModelConfig {
            provider: provider.to_string(),
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_create_mock_client() {
        let config = ModelConfig {
            model_name: Some("test-model".to_string()),
            ..model_config("mock")
        };

        let client = create_client(&config).unwrap();
        assert_eq!(client.kind(), ProviderKind::Mock);
        assert_eq!(client.model_name(), "test-model");
    }

    #[test]
    fn test_create_unknown_provider() {
        assert!(create_client(&model_config("unknown-provider")).is_err());
    }

    #[cfg(feature = "openai")]
    #[test]
    fn test_create_openai_client_with_direct_key() {
        let config = ModelConfig {
            api_key_source: Some("sk-direct".to_string()),
            model_name: Some("gpt-4.1-mini".to_string()),
            base_url: Some("http://localhost:1234/v1".to_string()),
            ..model_config("openai")
        };

        let client = create_client(&config).unwrap();
        assert_eq!(client.kind(), ProviderKind::OpenAI);
        assert_eq!(client.model_name(), "gpt-4.1-mini");
    }

    #[test]
    #[serial]
    fn test_load_api_key_from_env() {
        unsafe {
            std::env::set_var("AIMI_TEST_API_KEY", "env-key-value");
        }
        let key = load_api_key_from_env("AIMI_TEST_API_KEY").unwrap();
        assert_eq!(key, "env-key-value");
        unsafe {
            std::env::remove_var("AIMI_TEST_API_KEY");
        }
    }

    #[test]
    fn test_load_api_key_env_var_missing() {
        assert!(load_api_key_from_env("AIMI_NONEXISTENT_VAR").is_err());
    }

    #[test]
    fn test_resolve_api_key_direct() {
        assert_eq!(resolve_api_key("sk-direct-api-key").unwrap(), "sk-direct-api-key");
    }

    #[test]
    #[serial]
    fn test_resolve_api_key_from_env() {
        unsafe {
            std::env::set_var("AIMI_TEST_RESOLVE_KEY", "env-resolved-value");
        }
        let key = resolve_api_key("env:AIMI_TEST_RESOLVE_KEY").unwrap();
        assert_eq!(key, "env-resolved-value");
        unsafe {
            std::env::remove_var("AIMI_TEST_RESOLVE_KEY");
        }
    }

    #[test]
    fn test_resolve_api_key_from_file_trims_whitespace() {
        use std::io::Write;
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("api_key.txt");
        let mut file = std::fs::File::create(&file_path).unwrap();
        writeln!(file, "  file-api-key-value  ").unwrap();

        let key = resolve_api_key(&format!("file:{}", file_path.display())).unwrap();
        assert_eq!(key, "file-api-key-value");
    }
}
