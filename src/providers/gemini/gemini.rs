use async_trait::async_trait;
use anyhow::{anyhow, bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::AppConfig;
use crate::providers::traits::{EmbeddingProvider, TaskType};

/// Embeddings through the Gemini REST API (`models/*:embedContent`).
#[derive(Clone)]
pub struct GeminiProvider {
    api_key: String,
    client: Client,
    api_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, api_url: String, model: String) -> Result<Self> {
        anyhow::ensure!(!api_key.trim().is_empty(), "missing Gemini API key");
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("failed to build Gemini HTTP client")?;

        Ok(Self {
            api_key,
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("GEMINI_API_KEY must be set to compute embeddings"))?;
        Self::new(api_key, config.api_url.clone(), config.embedding_model.clone())
    }

    fn endpoint(&self) -> String {
        format!("{}/{}:embedContent", self.api_url, self.model)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    async fn embed(&self, text: &str, task: TaskType, title: Option<&str>) -> Result<Vec<f32>> {
        let request = EmbedRequest::new(&self.model, text, task, title);

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .context("failed to call Gemini embedContent")?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            bail!("Gemini embeddings request failed ({}): {}", status, body);
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .context("failed to parse Gemini embedding response")?;
        anyhow::ensure!(!parsed.embedding.values.is_empty(), "Gemini returned an empty embedding");
        Ok(parsed.embedding.values)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

impl<'a> EmbedRequest<'a> {
    fn new(model: &'a str, text: &'a str, task: TaskType, title: Option<&'a str>) -> Self {
        // the API rejects a title outside document mode
        let title = match task {
            TaskType::RetrievalDocument => title.filter(|t| !t.is_empty()),
            TaskType::RetrievalQuery => None,
        };
        Self {
            model,
            content: Content {
                parts: vec![Part { text }],
            },
            task_type: task,
            title,
        }
    }
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Embedding,
}

#[derive(Debug, Deserialize)]
struct Embedding {
    values: Vec<f32>,
}
