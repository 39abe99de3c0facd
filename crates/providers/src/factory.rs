//! Provider construction from configuration.

use std::sync::Arc;

use toolwright_config::AppConfig;
use toolwright_core::error::ProviderError;
use toolwright_core::provider::Provider;

use crate::openai_compat::OpenAiCompatProvider;

/// Well-known base URLs for provider names.
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openai" => Some("https://api.openai.com/v1"),
        "openrouter" => Some("https://openrouter.ai/api/v1"),
        "ollama" => Some("http://localhost:11434/v1"),
        "groq" => Some("https://api.groq.com/openai/v1"),
        "together" => Some("https://api.together.xyz/v1"),
        _ => None,
    }
}

/// Build the configured provider.
///
/// `api_url` overrides the well-known URL; unknown provider names require
/// it. Every provider except `ollama` needs an API key.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = config.provider.as_str();

    let base_url = match (&config.api_url, default_base_url(name)) {
        (Some(url), _) => url.clone(),
        (None, Some(url)) => url.to_string(),
        (None, None) => {
            return Err(ProviderError::NotConfigured(format!(
                "unknown provider '{name}': set api_url for custom OpenAI-compatible endpoints"
            )));
        }
    };

    let api_key = match (&config.api_key, name) {
        (Some(key), _) => key.clone(),
        (None, "ollama") => String::new(),
        (None, _) => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{name}' (set api_key or TOOLWRIGHT_API_KEY)"
            )));
        }
    };

    tracing::debug!(provider = name, base_url = %base_url, "Building provider");
    Ok(Arc::new(OpenAiCompatProvider::new(name, base_url, api_key)))
}
