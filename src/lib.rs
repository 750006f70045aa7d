pub mod api;
pub mod commands;
pub mod config;
pub mod database;
pub mod document;
pub mod llm;
pub mod providers;

pub use config::AppConfig;
pub use database::Database;
pub use llm::{PaperSession, SemanticSearch};
