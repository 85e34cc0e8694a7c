//! yt-agent CLI
//!
//! Modes, in order of precedence:
//! - `--train`: guided authoring of a new knowledge base topic
//! - `--ingest FILE...`: convert Jupyter notebooks into knowledge documents
//! - agent mode: answer a single QUERY, or start an interactive session

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use yt_agent::agent::{
    AgentConfig, AgentOrchestrator, AgentSession, ExecutionGate, GenerationOutcome, RunReport,
    TaskEvent, TaskSlot,
};
use yt_agent::knowledge::{authoring, ingest_notebook};
use yt_agent::tracing::{init_tracing, shutdown_tracing};

/// yt Agent - natural-language data analysis
#[derive(Parser, Debug)]
#[command(name = "yt-agent", version)]
#[command(about = "Generate and run yt analysis code from natural-language requests")]
struct Cli {
    /// Process a single query and exit
    query: Option<String>,

    /// Start an interactive session
    #[arg(short, long)]
    interactive: bool,

    /// Automatically execute generated code
    #[arg(short = 'x', long)]
    execute: bool,

    /// Launch interactive training mode to add knowledge
    #[arg(long)]
    train: bool,

    /// Ingest one or more .ipynb files into the knowledge base
    #[arg(long, value_name = "FILE", num_args = 1..)]
    ingest: Vec<PathBuf>,

    /// Model used for generation
    #[arg(long)]
    model: Option<String>,

    /// Directory of markdown knowledge documents
    #[arg(long, value_name = "DIR")]
    knowledge_base: Option<PathBuf>,

    /// Always send the knowledge base inline instead of caching it
    #[arg(long)]
    no_cache: bool,

    /// Print Prometheus metrics before exiting
    #[arg(long)]
    metrics: bool,

    /// Export traces to this OTLP collector
    #[arg(long, value_name = "URL")]
    otlp_endpoint: Option<String>,
}

impl Cli {
    fn agent_config(&self) -> AgentConfig {
        let mut config = AgentConfig::from_env();
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(dir) = &self.knowledge_base {
            config.knowledge_base_dir = dir.clone();
        }
        if self.no_cache {
            config.caching_enabled = false;
        }
        config
    }
}

/// Asks on the terminal before running generated code
struct TerminalGate;

#[async_trait]
impl ExecutionGate for TerminalGate {
    async fn approve(&self, _code: &str) -> bool {
        let answer = tokio::task::spawn_blocking(|| {
            dialoguer::Confirm::new()
                .with_prompt("Execute this code?")
                .default(false)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(approved)) => approved,
            Ok(Err(e)) => {
                warn!(error = %e, "Confirmation prompt failed, skipping execution");
                false
            }
            Err(e) => {
                warn!(error = %e, "Confirmation task failed, skipping execution");
                false
            }
        }
    }
}

fn print_generation(outcome: &GenerationOutcome) {
    println!("\n--- Generated Code ---\n");
    println!("{}", outcome.code);
    println!("\n----------------------");
}

fn print_report(report: &RunReport, auto_execute: bool) {
    match &report.execution {
        Some(result) => {
            if !result.stdout.is_empty() {
                println!("[STDOUT]\n{}", result.stdout);
            }
            if !result.stderr.is_empty() {
                println!("[STDERR]\n{}", result.stderr);
            }
            if let Some(fault) = &result.exception {
                println!("[EXCEPTION]\n{}", fault);
            }
            println!(
                "[AGENT] {} in {:.2}ms",
                if report.success { "✅ Execution succeeded" } else { "❌ Execution failed" },
                result.duration_ms
            );
        }
        None if !report.generation.is_ready() => {
            println!("\n(Execution skipped: code generation failed.)");
        }
        None if !auto_execute => {
            println!("\n(Execution skipped. Use --execute to run.)");
        }
        None => println!("\n(Execution skipped.)"),
    }
}

fn run_ingest(files: &[PathBuf], kb_dir: &std::path::Path) {
    for path in files {
        println!("Ingesting {}...", path.display());
        match ingest_notebook(path, kb_dir) {
            Ok(output) => println!("  → {}", output.display()),
            Err(e) => println!("Skipping {}: {}", path.display(), e),
        }
    }
}

async fn run_interactive(orchestrator: Arc<AgentOrchestrator>, auto_execute: bool) -> std::io::Result<()> {
    let (slot, mut events) = TaskSlot::new(Arc::clone(&orchestrator));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("\n--- yt Agent Interactive Mode ---");
    println!("Type your query (or 'exit' to quit).");

    loop {
        print!("\n>> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        if let Err(e) = slot.submit(query) {
            println!("[AGENT] {}", e);
            continue;
        }

        while let Some(event) = events.recv().await {
            match event {
                TaskEvent::Started { query } => println!("[AGENT] Processing '{}'...", query),
                TaskEvent::Finished { query, outcome } => {
                    print_generation(&outcome);
                    let report = orchestrator.complete(&query, outcome, auto_execute).await;
                    print_report(&report, auto_execute);
                    break;
                }
                TaskEvent::Aborted { query } => {
                    println!("[AGENT] ❌ Processing '{}' failed unexpectedly", query);
                    break;
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    init_tracing("yt-agent", cli.otlp_endpoint.as_deref())?;

    let config = cli.agent_config();

    if cli.train {
        authoring::interview(&config.knowledge_base_dir)?;
        shutdown_tracing();
        return Ok(());
    }

    if !cli.ingest.is_empty() {
        run_ingest(&cli.ingest, &config.knowledge_base_dir);
        shutdown_tracing();
        return Ok(());
    }

    println!("[AGENT] Initializing yt Agent...");
    let kb_dir = config.knowledge_base_dir.clone();
    let session = AgentSession::establish(config).await;
    println!(
        "[AGENT] Loaded knowledge base from {} ({} characters)",
        kb_dir.display(),
        session.context().char_len()
    );
    if let Some(handle) = session.cache_handle().await {
        println!("[AGENT] Using context cache {}", handle.remote_id);
    }

    let mut orchestrator = AgentOrchestrator::new(session);
    if std::io::stdin().is_terminal() {
        orchestrator = orchestrator.with_gate(TerminalGate);
    }
    let orchestrator = Arc::new(orchestrator);

    if let Some(query) = &cli.query {
        println!("[AGENT] Processing '{}'...", query);
        let generation = orchestrator.generate(query).await;
        print_generation(&generation);
        let report = orchestrator.complete(query, generation, cli.execute).await;
        print_report(&report, cli.execute);
    }

    // A single query exits unless an interactive session was also requested
    if cli.query.is_none() || cli.interactive {
        run_interactive(Arc::clone(&orchestrator), cli.execute).await?;
    }

    if cli.metrics {
        println!("{}", yt_agent::metrics::render());
    }

    shutdown_tracing();
    Ok(())
}
