use anyhow::{bail, Result};
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::providers::gemini::GeminiProvider;
use crate::providers::traits::{EmbeddingProvider, TaskType};

/// Stand-in used when no API key is configured. Section lookups keep
/// working; anything that needs an embedding fails with a clear message.
pub struct UnconfiguredProvider;

#[async_trait]
impl EmbeddingProvider for UnconfiguredProvider {
    async fn embed(&self, _text: &str, _task: TaskType, _title: Option<&str>) -> Result<Vec<f32>> {
        bail!("no embedding provider configured; set GEMINI_API_KEY")
    }

    fn model_name(&self) -> &str {
        "unconfigured"
    }
}

/// Gemini when a key is available, otherwise [`UnconfiguredProvider`].
pub fn provider_from_config(config: &AppConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    if config.api_key.is_none() {
        warn!("GEMINI_API_KEY is not set; text search and embedding are disabled");
        return Ok(Arc::new(UnconfiguredProvider));
    }
    Ok(Arc::new(GeminiProvider::from_config(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_yields_unconfigured_provider() {
        let config = AppConfig::default();
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.model_name(), "unconfigured");
        let err = provider.embed("x", TaskType::RetrievalQuery, None).await.unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn configured_key_yields_gemini() {
        let config = AppConfig {
            api_key: Some("secret".into()),
            ..AppConfig::default()
        };
        let provider = provider_from_config(&config).unwrap();
        assert_eq!(provider.model_name(), config.embedding_model);
    }
}
