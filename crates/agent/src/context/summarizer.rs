//! Summarizers compress an old block of turns into one paragraph.

use async_trait::async_trait;
use lokal_core::error::ProviderError;
use lokal_core::message::Turn;
use lokal_core::provider::{GenerationParams, Provider, ProviderRequest};
use std::sync::Arc;

const SUMMARY_INSTRUCTIONS: &str = "Summarize the conversation below in a few sentences. \
Keep names, numbers, decisions and open questions. Reply with the summary only.";

/// Turns a block of history into summary text.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, turns: &[Turn]) -> Result<String, ProviderError>;
}

/// Summarizer that asks the model backend.
pub struct ProviderSummarizer {
    provider: Arc<dyn Provider>,
    model: String,
}

impl ProviderSummarizer {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

/// Render turns as `role: content` lines.
pub fn transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    async fn summarize(&self, turns: &[Turn]) -> Result<String, ProviderError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: vec![Turn::system(SUMMARY_INSTRUCTIONS), Turn::user(transcript(turns))],
            params: GenerationParams {
                max_tokens: Some(512),
                temperature: 0.2,
                ..GenerationParams::default()
            },
            stream: false,
        };
        let response = self.provider.complete(request).await?;
        let summary = response.content.trim().to_string();
        if summary.is_empty() {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: "empty summary".into(),
            });
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::SequentialMockProvider;

    #[test]
    fn transcript_lists_roles() {
        let text = transcript(&[Turn::user(" hi "), Turn::assistant("hello")]);
        assert_eq!(text, "user: hi\nassistant: hello");
    }

    #[tokio::test]
    async fn provider_summarizer_sends_transcript() {
        let provider = Arc::new(SequentialMockProvider::texts(&["They talked about Peru."]));
        let summarizer = ProviderSummarizer::new(provider.clone(), "m");
        let summary = summarizer
            .summarize(&[Turn::user("capital of Peru?"), Turn::assistant("Lima")])
            .await
            .unwrap();
        assert_eq!(summary, "They talked about Peru.");

        let requests = provider.requests();
        assert_eq!(requests[0].messages.len(), 2);
        assert!(requests[0].messages[1].content.contains("user: capital of Peru?"));
    }

    #[tokio::test]
    async fn blank_summary_is_an_error() {
        let provider = Arc::new(SequentialMockProvider::texts(&["   "]));
        let summarizer = ProviderSummarizer::new(provider, "m");
        assert!(summarizer.summarize(&[Turn::user("x")]).await.is_err());
    }
}
