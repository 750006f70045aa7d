use async_trait::async_trait;
use anyhow::Result;
use serde::Serialize;

/// How an embedding will be used; the model tunes the vector accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// A chunk of the paper being indexed.
    RetrievalDocument,
    /// A user question searched against the chunks.
    RetrievalQuery,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds one text. `title` is only meaningful for
    /// [`TaskType::RetrievalDocument`].
    async fn embed(&self, text: &str, task: TaskType, title: Option<&str>) -> Result<Vec<f32>>;

    fn model_name(&self) -> &str;
}
