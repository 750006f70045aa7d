pub mod embeddings;
pub mod semantic_search;
pub mod session;
pub mod tools;

pub use embeddings::EmbeddingGenerator;
pub use semantic_search::{SearchResult, SemanticSearch, SimilarityMetric};
pub use session::PaperSession;
pub use tools::{call_tool, function_declarations, FunctionResponse, ToolCall, ToolError};
