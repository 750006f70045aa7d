use anyhow::{Context, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::sync::Arc;

use crate::database::ChunkTable;
use crate::document::ChunkRecord;
use crate::providers::traits::{EmbeddingProvider, TaskType};

/// Content longer than this many characters is embedded in windows.
pub const MAX_DIRECT_CHARS: usize = 10_000;
pub const WINDOW_STRIDE: usize = 9_000;
pub const WINDOW_OVERLAP: usize = 1_000;

/// Splits `text` into overlapping character windows.
///
/// Window `i` spans `[max(i * 9000 - 1000, 0), min((i + 1) * 9000, len))`,
/// so every window after the first repeats the last 1000 characters of its
/// predecessor and the windows together cover the whole text.
pub fn split_windows(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len <= MAX_DIRECT_CHARS {
        return vec![text.to_string()];
    }

    let count = (len + WINDOW_STRIDE - 1) / WINDOW_STRIDE;
    (0..count)
        .map(|i| {
            let start = (i * WINDOW_STRIDE).saturating_sub(if i == 0 { 0 } else { WINDOW_OVERLAP });
            let end = ((i + 1) * WINDOW_STRIDE).min(len);
            chars[start..end].iter().collect()
        })
        .collect()
}

/// Combines window vectors, weighting each by `max(chars - 1000, 0)` and
/// dividing by the window count.
pub fn combine_windows(windows: &[(usize, Vec<f32>)]) -> Vec<f32> {
    let dims = windows.first().map_or(0, |(_, v)| v.len());
    let count = windows.len() as f32;
    let mut combined = vec![0.0f32; dims];
    for (chars, vector) in windows {
        let weight = chars.saturating_sub(WINDOW_OVERLAP) as f32 / count;
        for (acc, value) in combined.iter_mut().zip(vector) {
            *acc += weight * value;
        }
    }
    combined
}

pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    concurrency: usize,
    show_progress: bool,
}

impl EmbeddingGenerator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, concurrency: usize) -> Self {
        Self {
            provider,
            concurrency: concurrency.max(1),
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Embeds one record in document mode with its title as context.
    pub async fn generate_embedding(&self, record: &ChunkRecord) -> Result<Vec<f32>> {
        let title = record.title();
        let title = (!title.is_empty()).then_some(title);
        let windows = split_windows(&record.content);

        if windows.len() == 1 {
            return self
                .provider
                .embed(&record.content, TaskType::RetrievalDocument, title)
                .await;
        }

        debug!("embedding '{}' in {} windows", record.title(), windows.len());
        let mut vectors = Vec::with_capacity(windows.len());
        for window in &windows {
            let vector = self.provider.embed(window, TaskType::RetrievalDocument, title).await?;
            vectors.push((window.chars().count(), vector));
        }
        Ok(combine_windows(&vectors))
    }

    /// Embeds every record, at most `concurrency` at a time, returning the
    /// vectors in input order. The first failure aborts the batch.
    pub async fn generate_batch_embeddings(&self, records: &[ChunkRecord]) -> Result<Vec<Vec<f32>>> {
        let progress = self.progress_bar(records.len() as u64);

        let embeddings: Vec<Vec<f32>> = stream::iter(records.iter().enumerate())
            .map(|(index, record)| {
                let progress = progress.clone();
                async move {
                    let embedding = self
                        .generate_embedding(record)
                        .await
                        .with_context(|| format!("failed to embed chunk {} ('{}')", index, record.title()))?;
                    progress.set_message(record.title().to_string());
                    progress.inc(1);
                    Ok::<_, anyhow::Error>(embedding)
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;
        progress.finish_and_clear();

        if let Some(first) = embeddings.first() {
            let dims = first.len();
            anyhow::ensure!(
                embeddings.iter().all(|e| e.len() == dims),
                "embedding model returned vectors of differing dimensions"
            );
        }
        info!("Generated {} embeddings with {}", embeddings.len(), self.provider.model_name());
        Ok(embeddings)
    }

    /// Embeds rows that have no embedding yet. Returns how many were filled.
    pub async fn fill_missing(&self, table: &mut ChunkTable) -> Result<usize> {
        let missing = table.missing_embeddings();
        if missing.is_empty() {
            return Ok(0);
        }

        let records: Vec<ChunkRecord> = missing.iter().map(|&i| table.rows[i].to_record()).collect();
        let embeddings = self.generate_batch_embeddings(&records).await?;
        for (index, embedding) in missing.iter().zip(embeddings) {
            table.rows[*index].embedding = Some(embedding);
        }
        Ok(missing.len())
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}") {
            progress.set_style(style.progress_chars("=>-"));
        }
        progress
    }
}
