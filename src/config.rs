use std::env;
use std::path::PathBuf;

use crate::document::bibliography::DEFAULT_MAX_BYTES;
use crate::llm::semantic_search::SimilarityMetric;

pub const DEFAULT_EMBEDDING_MODEL: &str = "models/text-embedding-004";
pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub embedding_model: String,
    pub data_dir: PathBuf,
    pub embedding_concurrency: usize,
    pub bibliography_max_bytes: usize,
    pub similarity: SimilarityMetric,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_API_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            data_dir: PathBuf::from("data"),
            embedding_concurrency: 4,
            bibliography_max_bytes: DEFAULT_MAX_BYTES,
            similarity: SimilarityMetric::Dot,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let api_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("GOOGLE_API_KEY"))
            .ok()
            .filter(|key| !key.trim().is_empty());

        let api_url = env::var("GEMINI_API_URL").unwrap_or(defaults.api_url);
        let embedding_model = env::var("GEMINI_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model);

        let data_dir = env::var("PAPER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        // Zero would stall the embedding pool
        let embedding_concurrency = env::var("EMBEDDING_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(defaults.embedding_concurrency);

        let bibliography_max_bytes = env::var("BIBLIOGRAPHY_MAX_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.bibliography_max_bytes);

        let similarity = env::var("SIMILARITY_METRIC")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.similarity);

        Self {
            api_key,
            api_url,
            embedding_model,
            data_dir,
            embedding_concurrency,
            bibliography_max_bytes,
            similarity,
        }
    }
}
