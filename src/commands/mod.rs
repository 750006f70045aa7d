use colored::Colorize;
use serde_json::Value;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::Database;
use crate::llm::semantic_search::{SearchResult, DEFAULT_MIN_SIMILARITY, DEFAULT_TOP_N};
use crate::llm::{function_declarations, EmbeddingGenerator, PaperSession, ToolCall};
use crate::providers::{provider_from_config, EmbeddingProvider};

pub mod document;
mod system;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Exit,
}

/// State of the interactive shell: the store, the provider and the paper
/// currently open.
pub struct CommandHandler {
    config: AppConfig,
    db: Arc<Database>,
    provider: Arc<dyn EmbeddingProvider>,
    template: String,
    session: Option<PaperSession>,
}

impl CommandHandler {
    pub fn new(config: AppConfig, template: String) -> Result<Self, String> {
        let provider = provider_from_config(&config).map_err(|e| format!("Failed to initialize provider: {}", e))?;
        Self::with_provider(config, template, provider)
    }

    pub fn with_provider(config: AppConfig, template: String, provider: Arc<dyn EmbeddingProvider>) -> Result<Self, String> {
        let db = Database::new(&config.data_dir).map_err(|e| format!("Failed to initialize database: {}", e))?;
        Ok(Self {
            config,
            db: Arc::new(db),
            provider,
            template,
            session: None,
        })
    }

    pub fn session(&self) -> Option<&PaperSession> {
        self.session.as_ref()
    }

    pub fn prompt(&self) -> String {
        match &self.session {
            Some(session) => format!("[{}] > ", session.title()),
            None => "> ".to_string(),
        }
    }

    pub async fn handle_command(&mut self, input: &str) -> Result<CommandOutcome, String> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(CommandOutcome::Continue);
        }

        let (command, rest) = match input.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (input, ""),
        };

        match command.to_lowercase().as_str() {
            "help" => system::print_help(),
            "exit" | "quit" => {
                println!("👋 Goodbye!");
                return Ok(CommandOutcome::Exit);
            }
            "papers" => self.list_papers()?,
            "open" => self.open_paper(rest)?,
            "add" => self.add_paper(rest).await?,
            "inst" => self.handle_instruction(rest)?,
            "tools" => println!("{}", pretty(&function_declarations())),
            "section" => self.search_sections(rest)?,
            "search" => self.search_text(rest).await?,
            "call" => self.call_tool(rest).await?,
            _ => return Err(format!("Unknown command: {}. Type 'help' for available commands.", command)),
        }
        Ok(CommandOutcome::Continue)
    }

    fn current_session(&self) -> Result<&PaperSession, String> {
        self.session
            .as_ref()
            .ok_or_else(|| "No paper is open. Use 'open <title>' first.".to_string())
    }

    fn list_papers(&self) -> Result<(), String> {
        let papers = self.db.papers().map_err(|e| e.to_string())?;
        if papers.is_empty() {
            println!("No papers registered yet. Use 'add <path>' to add one.");
            return Ok(());
        }
        println!("\n📚 Registered papers:");
        for title in papers {
            let marker = match &self.session {
                Some(session) if session.title() == title => "*".green(),
                _ => " ".normal(),
            };
            println!("  {} {}", marker, title.bright_yellow());
        }
        Ok(())
    }

    fn open_paper(&mut self, title: &str) -> Result<(), String> {
        if title.is_empty() {
            return Err("Usage: open <title>".to_string());
        }
        let session = PaperSession::open(&self.db, Arc::clone(&self.provider), self.config.similarity, title)
            .map_err(|e| format!("Failed to open paper: {}", e))?;
        println!(
            "📖 Opened '{}' ({} chunks)",
            session.title().bright_green(),
            session.search().table().len().to_string().cyan()
        );
        self.session = Some(session);
        Ok(())
    }

    async fn add_paper(&mut self, args: &str) -> Result<(), String> {
        let generator = EmbeddingGenerator::new(Arc::clone(&self.provider), self.config.embedding_concurrency);
        let added = document::handle_add(
            args,
            &self.db,
            &generator,
            &self.template,
            self.config.bibliography_max_bytes,
        )
        .await?;
        self.open_paper(&added.title)
    }

    fn handle_instruction(&mut self, args: &str) -> Result<(), String> {
        let (subcommand, text) = match args.split_once(char::is_whitespace) {
            Some((subcommand, text)) => (subcommand, text.trim()),
            None => (args, ""),
        };

        match subcommand {
            "" => {
                let session = self.current_session()?;
                println!("{}", session.instruction());
            }
            "set" => {
                if text.is_empty() {
                    return Err("Usage: inst set <text>".to_string());
                }
                let session = self
                    .session
                    .as_mut()
                    .ok_or_else(|| "No paper is open. Use 'open <title>' first.".to_string())?;
                session
                    .set_instruction(&self.db, text.to_string())
                    .map_err(|e| format!("Failed to save instruction: {}", e))?;
                println!("✅ Instruction saved");
            }
            other => return Err(format!("Unknown inst subcommand: {}. Use 'inst' or 'inst set <text>'.", other)),
        }
        Ok(())
    }

    fn search_sections(&self, args: &str) -> Result<(), String> {
        let session = self.current_session()?;
        let query: Vec<Option<String>> = args
            .split('/')
            .map(str::trim)
            .map(|name| (!name.is_empty()).then(|| name.to_string()))
            .take(3)
            .collect();
        let results = session.search().search_from_section_names(&query);
        print_results(&results);
        Ok(())
    }

    async fn search_text(&self, query: &str) -> Result<(), String> {
        if query.is_empty() {
            return Err("Usage: search <text>".to_string());
        }
        let session = self.current_session()?;
        let results = session
            .search()
            .search_from_text(query, DEFAULT_TOP_N, DEFAULT_MIN_SIMILARITY)
            .await
            .map_err(|e| format!("Search failed: {:#}", e))?;
        print_results(&results);
        Ok(())
    }

    async fn call_tool(&self, args: &str) -> Result<(), String> {
        let (name, json) = args.split_once(char::is_whitespace).unwrap_or((args, "{}"));
        if name.is_empty() {
            return Err("Usage: call <name> <json>".to_string());
        }
        let arguments: Value = serde_json::from_str(json).map_err(|e| format!("Invalid JSON arguments: {}", e))?;
        let session = self.current_session()?;
        let call = ToolCall::parse(name, &arguments).map_err(|e| e.to_string())?;

        println!("{}", call.render().dimmed());
        let response = session
            .run(&call)
            .await
            .map_err(|e| format!("Tool call failed: {:#}", e))?;
        match serde_json::to_value(&response) {
            Ok(value) => println!("{}", pretty(&value)),
            Err(e) => return Err(format!("Failed to encode response: {}", e)),
        }
        Ok(())
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No matching chunks.");
        return;
    }
    for result in results {
        let path = [&result.section, &result.subsection, &result.subsubsection]
            .iter()
            .filter(|name| !name.is_empty())
            .map(|name| name.as_str())
            .collect::<Vec<_>>()
            .join(" / ");
        match result.similarity {
            Some(score) => println!("\n📄 {} (similarity: {:.3})", path.bright_cyan(), score),
            None => println!("\n📄 {}", path.bright_cyan()),
        }
        println!("{}", result.content.truecolor(255, 236, 179));
    }
    println!();
}
