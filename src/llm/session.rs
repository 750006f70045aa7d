use anyhow::Result;
use log::{info, warn};
use serde_json::Value;
use std::sync::Arc;

use super::semantic_search::{SemanticSearch, SimilarityMetric};
use super::tools::{self, FunctionResponse, ToolCall};
use crate::database::{Database, DatabaseError};
use crate::providers::traits::EmbeddingProvider;

/// One opened paper: its instruction and a retriever over its chunks.
#[derive(Clone)]
pub struct PaperSession {
    title: String,
    instruction: String,
    search: SemanticSearch,
}

impl PaperSession {
    pub fn new(title: impl Into<String>, instruction: impl Into<String>, search: SemanticSearch) -> Self {
        Self {
            title: title.into(),
            instruction: instruction.into(),
            search,
        }
    }

    /// Loads a registered paper's table and instruction.
    pub fn open(
        db: &Database,
        provider: Arc<dyn EmbeddingProvider>,
        metric: SimilarityMetric,
        title: &str,
    ) -> Result<Self, DatabaseError> {
        let table = db.load_table(title)?;
        let instruction = db.load_instruction(title)?;

        let missing = table.missing_embeddings().len();
        if missing > 0 {
            warn!("'{}' has {} chunks without embeddings; text search will skip them", title, missing);
        }
        info!("Opened '{}' ({} chunks)", title, table.len());

        Ok(Self::new(title, instruction, SemanticSearch::new(table, provider, metric)))
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn search(&self) -> &SemanticSearch {
        &self.search
    }

    /// Replaces the instruction and writes it back to the store.
    pub fn set_instruction(&mut self, db: &Database, instruction: String) -> Result<(), DatabaseError> {
        db.save_instruction(&self.title, &instruction)?;
        self.instruction = instruction;
        Ok(())
    }

    /// Re-reads the stored instruction.
    pub fn reload_instruction(&mut self, db: &Database) -> Result<(), DatabaseError> {
        self.instruction = db.load_instruction(&self.title)?;
        Ok(())
    }

    pub async fn call_tool(&self, name: &str, args: &Value) -> Result<FunctionResponse> {
        tools::call_tool(&self.search, name, args).await
    }

    pub async fn run(&self, call: &ToolCall) -> Result<FunctionResponse> {
        tools::run_call(&self.search, call).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ChunkTable;
    use crate::document::ChunkRecord;
    use crate::llm::semantic_search::tests::FixedProvider;
    use serde_json::json;
    use tempfile::tempdir;

    fn stored_paper(db: &Database) {
        let mut table = ChunkTable::from_records(vec![
            ChunkRecord {
                section: "Abstract".into(),
                content: "We study things.".into(),
                ..Default::default()
            },
            ChunkRecord {
                section: "Results".into(),
                content: "It works.".into(),
                ..Default::default()
            },
        ]);
        table.rows[0].embedding = Some(vec![1.0, 0.0]);
        let (entry, _) = db.store_paper(&table, "You are a helpful assistant.").unwrap();
        db.register("A Paper", entry).unwrap();
    }

    #[tokio::test]
    async fn opened_session_answers_tool_calls() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path()).unwrap();
        stored_paper(&db);

        let session = PaperSession::open(&db, Arc::new(FixedProvider(vec![1.0, 0.0])), SimilarityMetric::Dot, "A Paper").unwrap();
        assert_eq!(session.instruction(), "You are a helpful assistant.");

        let response = session
            .call_tool("search_from_text", &json!({"query": "what"}))
            .await
            .unwrap();
        let rows: Vec<Value> = serde_json::from_str(&response.response.result).unwrap();
        // the row without an embedding is skipped
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["section"], "Abstract");
    }

    #[test]
    fn instruction_edits_are_persisted() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path()).unwrap();
        stored_paper(&db);

        let provider = Arc::new(FixedProvider(vec![1.0]));
        let mut session = PaperSession::open(&db, provider.clone(), SimilarityMetric::Dot, "A Paper").unwrap();
        session.set_instruction(&db, "Answer briefly.".into()).unwrap();

        let reopened = PaperSession::open(&db, provider, SimilarityMetric::Dot, "A Paper").unwrap();
        assert_eq!(reopened.instruction(), "Answer briefly.");
    }

    #[test]
    fn unknown_paper_fails_to_open() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path()).unwrap();
        let result = PaperSession::open(&db, Arc::new(FixedProvider(vec![1.0])), SimilarityMetric::Dot, "Missing");
        assert!(matches!(result, Err(DatabaseError::UnknownPaper(_))));
    }
}
