//! noema - command-line entry point for the cognitive engine.
//!
//! Two modes, both built on the same `Engine` composition root: an
//! interactive REPL that forwards each line to `inject_text` and prints the
//! resulting status record, and a one-shot file-ingestion mode for scripting.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use noema_adapters::{OllamaTripleExtractor, WikiEnrichHandler, WikipediaSummaryFetcher, WIKI_ENRICH_HANDLER_CODE};
use noema_core::{ActionExecutor, Engine, EngineConfig};

/// Lines a REPL user can type to stop the session and shut down the cognitive loop.
const QUIT_TOKENS: &[&str] = &["quit", "exit", "q"];

#[derive(Parser)]
#[command(name = "noema")]
#[command(author, version, about = "A typed knowledge graph with activation dynamics and action dispatch", long_about = None)]
struct Cli {
    /// Path to a TOML/JSON/YAML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session (default if no subcommand is given).
    Repl,
    /// Ingest every non-blank line of a file, then exit.
    Ingest {
        /// Path to a file of newline-separated utterances.
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("noema=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::from_env(),
    };

    let triple_extractor = Arc::new(OllamaTripleExtractor::new(config.triple_extractor.clone())?);
    let summary_fetcher = Arc::new(WikipediaSummaryFetcher::new(config.summary_fetcher.clone())?);

    let action_executor = ActionExecutor::new(config.action.clone()).with_handler(
        WIKI_ENRICH_HANDLER_CODE,
        Arc::new(WikiEnrichHandler::new(triple_extractor.clone(), summary_fetcher.clone())),
    );

    let (engine, mut status_rx) = Engine::new(config, triple_extractor, summary_fetcher, action_executor)?;
    let engine = Arc::new(engine);

    engine.start().await?;
    info!("cognitive loop started");

    tokio::spawn(async move {
        while let Some(status) = status_rx.recv().await {
            tracing::debug!(?status, "status update");
        }
    });

    let result = match cli.command.unwrap_or(Commands::Repl) {
        Commands::Repl => run_repl(engine.clone()).await,
        Commands::Ingest { file } => run_ingest(engine.clone(), &file).await,
    };

    if let Err(e) = engine.shutdown().await {
        tracing::warn!(error = %e, "cognitive loop shutdown failed");
    }
    result
}

async fn run_repl(engine: Arc<Engine>) -> Result<(), Box<dyn std::error::Error>> {
    println!("noema cognitive engine. Type a line to ingest it, or 'quit'/'exit'/'q' to exit.");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        if QUIT_TOKENS.iter().any(|token| line.trim().eq_ignore_ascii_case(token)) {
            break;
        }

        let status = engine.inject_text(&line).await?;
        print_status(&status);
    }

    Ok(())
}

async fn run_ingest(engine: Arc<Engine>, path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let file = std::fs::File::open(path)?;
    for line in io::BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let status = engine.inject_text(&line).await?;
        print_status(&status);
    }
    Ok(())
}

fn print_status(status: &noema_core::StatusRecord) {
    match serde_json::to_string(status) {
        Ok(json) => println!("{json}"),
        Err(_) => println!("{status:?}"),
    }
}
