use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use dotenv::dotenv;
use log::info;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use paper_chat::api::{self, AppState};
use paper_chat::commands::document::{add_paper, embed_file, load_template, process_to_files};
use paper_chat::commands::{CommandHandler, CommandOutcome};
use paper_chat::config::AppConfig;
use paper_chat::database::{Database, StoreOutcome};
use paper_chat::llm::EmbeddingGenerator;
use paper_chat::providers::{provider_from_config, GeminiProvider};

#[derive(Parser, Debug)]
#[command(author, version, about = "Chat with LaTeX papers through section and embedding retrieval", long_about = None)]
struct Args {
    /// Gemini API key (overrides GEMINI_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Directory holding papers.json and the processed papers
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Parallel embedding requests
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the chunk table and instruction of a LaTeX file
    Process {
        latex_file: PathBuf,
        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,
        /// Instruction template file
        #[arg(short, long)]
        template: Option<PathBuf>,
        /// Output instruction file
        #[arg(long)]
        inst: Option<PathBuf>,
    },
    /// Fill in missing embeddings of a chunk table
    Embed {
        csv_file: PathBuf,
        /// Output CSV file; the input is overwritten when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Process, embed and register a paper (a .tex file, a folder or a .tar.gz)
    Add {
        path: PathBuf,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        template: Option<PathBuf>,
    },
    /// Serve the retrieval tools over HTTP
    Serve {
        #[arg(long, env = "PORT", default_value = "3000")]
        port: u16,
    },
    /// Interactive shell (default)
    Shell {
        #[arg(short, long)]
        template: Option<PathBuf>,
    },
}

impl Args {
    fn config(&self) -> AppConfig {
        let mut config = AppConfig::from_env();
        if let Some(key) = &self.api_key {
            config.api_key = Some(key.clone());
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(n) = self.concurrency.filter(|&n| n > 0) {
            config.embedding_concurrency = n;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.config();

    match args.command {
        Some(Command::Process {
            latex_file,
            output,
            template,
            inst,
        }) => {
            let template = load_template(template.as_deref())?;
            let rows = process_to_files(&latex_file, &output, inst.as_deref(), &template, config.bibliography_max_bytes)?;
            println!("✅ Wrote {} chunks to {}", rows.to_string().cyan(), output.display());
            Ok(())
        }
        Some(Command::Embed { csv_file, output }) => {
            let generator = EmbeddingGenerator::new(
                std::sync::Arc::new(GeminiProvider::from_config(&config)?),
                config.embedding_concurrency,
            );
            let filled = embed_file(&generator, &csv_file, output.as_deref()).await?;
            println!("✅ Embedded {} chunks", filled.to_string().cyan());
            Ok(())
        }
        Some(Command::Add { path, title, template }) => {
            let template = load_template(template.as_deref())?;
            let db = Database::new(&config.data_dir)?;
            let generator = EmbeddingGenerator::new(
                std::sync::Arc::new(GeminiProvider::from_config(&config)?),
                config.embedding_concurrency,
            );
            let added = add_paper(
                &db,
                &generator,
                &path,
                title.as_deref(),
                &template,
                config.bibliography_max_bytes,
            )
            .await?;
            let verb = match added.outcome {
                StoreOutcome::Created => "Added",
                StoreOutcome::AlreadyStored => "Re-registered",
            };
            println!("✅ {} '{}' ({})", verb, added.title.bright_green(), added.entry.csv.display());
            Ok(())
        }
        Some(Command::Serve { port }) => run_api_server(config, port).await,
        Some(Command::Shell { template }) => run_shell(config, template).await,
        None => run_shell(config, None).await,
    }
}

async fn run_shell(config: AppConfig, template: Option<PathBuf>) -> Result<()> {
    let template = load_template(template.as_deref())?;
    let mut command_handler = CommandHandler::new(config, template).map_err(anyhow::Error::msg)?;

    // Show initial help menu
    if let Err(e) = command_handler.handle_command("help").await {
        println!("{}", e.red());
    }

    let mut rl = Editor::<(), DefaultHistory>::new()?;
    loop {
        match rl.readline(&command_handler.prompt()) {
            Ok(line) => {
                let input = line.trim();
                let _ = rl.add_history_entry(input);

                match command_handler.handle_command(input).await {
                    Ok(CommandOutcome::Exit) => break,
                    Ok(CommandOutcome::Continue) => {}
                    Err(e) => println!("{}", e.red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}

async fn run_api_server(config: AppConfig, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let db = Database::new(&config.data_dir)?;
    let provider = provider_from_config(&config)?;
    let app = api::create_api(AppState::new(db, provider, config.similarity));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Serving paper tools on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
