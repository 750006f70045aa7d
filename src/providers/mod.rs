pub mod gemini;
pub mod traits;
pub mod utils;

pub use gemini::GeminiProvider;
pub use traits::{EmbeddingProvider, TaskType};
pub use utils::{provider_from_config, UnconfiguredProvider};
