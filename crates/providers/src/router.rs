//! Provider construction from configuration.

use std::sync::Arc;

use tracing::info;
use wizard_config::AppConfig;
use wizard_core::provider::Provider;

use crate::openai_compat::OpenAiCompatProvider;

/// Build the configured provider.
///
/// Every supported backend speaks the OpenAI chat-completions dialect; only
/// the base URL and key differ.
pub fn build_from_config(config: &AppConfig) -> Arc<dyn Provider> {
    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.provider));
    let api_key = config.api_key.clone().unwrap_or_default();

    info!(provider = %config.provider, model = %config.model, %base_url, "Using model provider");
    Arc::new(OpenAiCompatProvider::new(
        &config.provider,
        base_url,
        api_key,
    ))
}

/// Get the default base URL for well-known providers.
pub fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "ollama" => "http://localhost:11434/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        // Unknown names are assumed to be local OpenAI-compatible servers.
        _ => "http://localhost:8080/v1".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_default_is_ollama() {
        let provider = build_from_config(&AppConfig::default());
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn build_from_config_with_hosted_provider() {
        let config = AppConfig {
            provider: "openrouter".into(),
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        let provider = build_from_config(&config);
        assert_eq!(provider.name(), "openrouter");
    }

    #[test]
    fn default_urls() {
        assert_eq!(default_base_url("ollama"), "http://localhost:11434/v1");
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
    }
}
