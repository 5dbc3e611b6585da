//! Model backend implementations for lokal.
//!
//! All backends implement the `lokal_core::Provider` trait. Every local
//! server lokal targets (llama.cpp, Ollama, vLLM, LM Studio) speaks the
//! OpenAI chat-completions dialect, so one implementation covers them.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use lokal_config::ModelConfig;
use lokal_core::Provider;
use std::sync::Arc;
use std::time::Duration;

/// Build the configured backend.
pub fn build_from_config(config: &ModelConfig) -> Arc<dyn Provider> {
    let base_url = if config.base_url.trim().is_empty() {
        default_base_url(&config.provider)
    } else {
        config.base_url.clone()
    };

    tracing::debug!(provider = %config.provider, base_url = %base_url, model = %config.model, "Building model backend");

    Arc::new(OpenAiCompatProvider::new(
        &config.provider,
        base_url,
        config.api_key.clone(),
        Duration::from_secs(config.request_timeout_secs),
    ))
}

/// Get the default base URL for well-known local servers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "ollama" => "http://localhost:11434/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "lmstudio" => "http://localhost:1234/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        _ => "http://127.0.0.1:8080/v1".into(),
    }
}
