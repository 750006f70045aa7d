use anyhow::{bail, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

use crate::database::{ChunkRow, ChunkTable};
use crate::providers::traits::{EmbeddingProvider, TaskType};

pub const DEFAULT_TOP_N: usize = 5;
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.0;

/// How a query vector is scored against stored chunk vectors.
///
/// `Dot` is the raw dot product, which equals cosine similarity for the
/// unit-length vectors Gemini returns. `Cosine` normalizes both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    Dot,
    Cosine,
}

impl SimilarityMetric {
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            SimilarityMetric::Dot => dot(a, b),
            SimilarityMetric::Cosine => cosine_similarity(a, b),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "dot" => Ok(SimilarityMetric::Dot),
            "cosine" => Ok(SimilarityMetric::Cosine),
            other => bail!("unknown similarity metric '{}', expected 'dot' or 'cosine'", other),
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

/// One row of a retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub section: String,
    pub subsection: String,
    pub subsubsection: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub similarity: Option<f32>,
}

impl SearchResult {
    fn from_row(row: &ChunkRow, similarity: Option<f32>) -> Self {
        Self {
            section: row.section.clone(),
            subsection: row.subsection.clone(),
            subsubsection: row.subsubsection.clone(),
            content: row.content.clone(),
            similarity,
        }
    }
}

/// Read-only retrieval over the chunk table of one paper.
#[derive(Clone)]
pub struct SemanticSearch {
    table: Arc<ChunkTable>,
    provider: Arc<dyn EmbeddingProvider>,
    metric: SimilarityMetric,
}

impl SemanticSearch {
    pub fn new(table: ChunkTable, provider: Arc<dyn EmbeddingProvider>, metric: SimilarityMetric) -> Self {
        Self {
            table: Arc::new(table),
            provider,
            metric,
        }
    }

    pub fn table(&self) -> &ChunkTable {
        &self.table
    }

    /// Looks rows up by their `[section, subsection, subsubsection]` path.
    ///
    /// Missing or `None` entries count as empty. Exact matches on all three
    /// fields win; without any, every field is matched by substring, where
    /// an empty query field matches anything.
    pub fn search_from_section_names(&self, names: &[Option<String>]) -> Vec<SearchResult> {
        let mut query = ["", "", ""];
        for (slot, name) in query.iter_mut().zip(names) {
            *slot = name.as_deref().unwrap_or("");
        }

        let exact: Vec<SearchResult> = self
            .table
            .rows
            .iter()
            .filter(|row| row_path(row) == query)
            .map(|row| SearchResult::from_row(row, None))
            .collect();
        if !exact.is_empty() {
            return exact;
        }

        debug!("no exact section match for {:?}, trying substrings", query);
        self.table
            .rows
            .iter()
            .filter(|row| row_path(row).iter().zip(query).all(|(field, q)| field.contains(q)))
            .map(|row| SearchResult::from_row(row, None))
            .collect()
    }

    /// Embeds `query` and returns the `top_n` most similar rows scoring at
    /// least `min_similarity`, best first. Rows without an embedding are
    /// skipped.
    pub async fn search_from_text(&self, query: &str, top_n: usize, min_similarity: f32) -> Result<Vec<SearchResult>> {
        let query_vector = self.provider.embed(query, TaskType::RetrievalQuery, None).await?;
        Ok(self.rank(&query_vector, top_n, min_similarity))
    }

    fn rank(&self, query_vector: &[f32], top_n: usize, min_similarity: f32) -> Vec<SearchResult> {
        let mut scored: Vec<(f32, &ChunkRow)> = self
            .table
            .rows
            .iter()
            .filter_map(|row| {
                let embedding = row.embedding.as_ref()?;
                if embedding.len() != query_vector.len() {
                    debug!("skipping '{}': embedding has {} dimensions", row.section, embedding.len());
                    return None;
                }
                Some((self.metric.score(query_vector, embedding), row))
            })
            .filter(|(score, _)| *score >= min_similarity)
            .collect();

        // stable sort keeps table order among equal scores
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
            .into_iter()
            .take(top_n)
            .map(|(score, row)| SearchResult::from_row(row, Some(score)))
            .collect()
    }
}

fn row_path(row: &ChunkRow) -> [&str; 3] {
    [&row.section, &row.subsection, &row.subsubsection]
}
