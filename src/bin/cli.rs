//! mcpagent CLI
//!
//! Runs the tool-calling agent against the configured MCP servers and
//! exposes the retrieval index, OHLCV metrics and configuration helpers.

use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use console::style;
use mcpagent::agent::{
    Agent, AgentOptions, CompletionMode, LoopCallback, LoopStep, LoopTrace, OpenAiClient,
    ToolObservation,
};
use mcpagent::config::{
    apply_env_overrides, config_path, read_config_snapshot, save_config, validate_config, Config,
    LogFormat,
};
use mcpagent::market::{compute_ohlcv_metrics, OhlcvBar};
use mcpagent::mcp::McpConnector;
use mcpagent::memory::{KnowledgeIndex, RemoteEmbedder};
use mcpagent::tools::ToolConnector;
use mcpagent::{Error, VERSION};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mcpagent",
    author = "mcpagent Contributors",
    version = VERSION,
    about = "mcpagent - tool-calling LLM agent over MCP servers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a prompt, calling tools as the model requests
    Run {
        /// The user prompt
        prompt: String,
        /// Model to use instead of the configured one
        #[arg(short, long)]
        model: Option<String>,
        /// Directory of text files to retrieve context from
        #[arg(long)]
        knowledge_dir: Option<PathBuf>,
        /// Number of documents injected as context
        #[arg(long)]
        top_k: Option<usize>,
        /// Request streamed completions
        #[arg(long)]
        stream: bool,
        /// Tool-call batches before giving up
        #[arg(long)]
        max_iterations: Option<u32>,
    },

    /// Connect to every configured server and list its tools
    Tools,

    /// Search the knowledge directory
    Search {
        /// Query text
        query: String,
        #[arg(long)]
        knowledge_dir: Option<PathBuf>,
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Summarize a JSON array of OHLCV bars
    Metrics {
        /// Path to the JSON file
        file: PathBuf,
    },

    /// Write a sample configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },

    /// Check the configuration for problems
    Validate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        eprintln!("{} {:#}", style("error:").red().bold(), e);
        if e.downcast_ref::<Error>().is_some_and(Error::is_fatal_to_run) {
            eprintln!(
                "{}",
                style("Check the configured servers and backend with `mcpagent validate`").dim()
            );
        }
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run {
            prompt,
            model,
            knowledge_dir,
            top_k,
            stream,
            max_iterations,
        } => {
            let overrides = RunOverrides {
                model,
                knowledge_dir,
                top_k,
                stream,
                max_iterations,
            };
            run(load()?, &prompt, overrides).await
        }
        Commands::Tools => list_tools(&load()?).await,
        Commands::Search {
            query,
            knowledge_dir,
            top_k,
        } => search(&load()?, &query, knowledge_dir, top_k).await,
        Commands::Metrics { file } => metrics(&file),
        Commands::InitConfig { force } => init_config(force),
        Commands::Validate => validate(),
    }
}

/// Load the layered configuration and install logging from it
fn load() -> anyhow::Result<Config> {
    let config = Config::from_env()?;
    init_logging(&config);
    Ok(config)
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log.level))
        .unwrap_or_else(|_| EnvFilter::new("mcpagent=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn print_section(title: &str) {
    println!();
    println!("{}", style(title).cyan().bold());
    println!("{}", style("─".repeat(title.chars().count().max(20))).dim());
}

// ============================================================================
// run
// ============================================================================

struct RunOverrides {
    model: Option<String>,
    knowledge_dir: Option<PathBuf>,
    top_k: Option<usize>,
    stream: bool,
    max_iterations: Option<u32>,
}

/// Prints loop progress to stderr so stdout carries only the answer
struct ProgressCallback;

#[async_trait]
impl LoopCallback for ProgressCallback {
    async fn on_iteration_start(&self, iteration: u32) {
        eprintln!("{} iteration {}", style("▶").cyan(), iteration);
    }

    async fn on_tool_executed(&self, tool_name: &str, observation: &ToolObservation) {
        let mark = if observation.success {
            style("✓").green()
        } else {
            style("✗").red()
        };
        eprintln!(
            "  {} {} {}",
            mark,
            style(tool_name).bold(),
            style(format!("({} ms)", observation.duration_ms)).dim()
        );
    }

    async fn on_iteration_end(&self, step: &LoopStep) {
        eprintln!(
            "  {}",
            style(format!(
                "{} tool call(s), batch started {}",
                step.actions.len(),
                step.timestamp.format("%H:%M:%S%.3f")
            ))
            .dim()
        );
    }

    async fn on_loop_complete(&self, trace: &LoopTrace) {
        eprintln!(
            "{} {} tool call(s) in {} ms ({:?})",
            style("■").cyan(),
            trace.tool_calls(),
            trace.total_duration_ms,
            trace.outcome
        );
    }
}

async fn build_index(config: &Config, dir: Option<PathBuf>) -> anyhow::Result<Option<KnowledgeIndex>> {
    let Some(dir) = dir.or_else(|| config.knowledge.dir.clone()) else {
        return Ok(None);
    };

    let embedder = RemoteEmbedder::new(&config.embedding)?;
    let mut index = KnowledgeIndex::new(Arc::new(embedder));
    let count = index
        .build_from_dir(&dir)
        .await
        .with_context(|| format!("building knowledge index from {}", dir.display()))?;
    info!("Indexed {} document(s) from {}", count, dir.display());
    Ok(Some(index))
}

async fn run(config: Config, prompt: &str, overrides: RunOverrides) -> anyhow::Result<()> {
    let top_k = overrides.top_k.unwrap_or(config.knowledge.top_k);
    let context = match build_index(&config, overrides.knowledge_dir).await? {
        Some(index) => Some(index.context_for(prompt, top_k).await?),
        None => None,
    };

    let connectors: Vec<Box<dyn ToolConnector>> = config
        .servers
        .iter()
        .map(|server| Box::new(McpConnector::from_config(server)) as Box<dyn ToolConnector>)
        .collect();

    let backend = Arc::new(OpenAiClient::new(&config.provider)?);

    let mode = if overrides.stream || config.agent.stream {
        CompletionMode::Streaming
    } else {
        CompletionMode::Blocking
    };
    let mut options = AgentOptions::new(overrides.model.unwrap_or_else(|| config.provider.model.clone()))
        .with_mode(mode)
        .with_max_iterations(overrides.max_iterations.unwrap_or(config.agent.max_iterations));
    if !config.agent.system_prompt.trim().is_empty() {
        options = options.with_system_prompt(config.agent.system_prompt.clone());
    }
    if let Some(context) = context.filter(|c| !c.is_empty()) {
        options = options.with_context(context);
    }

    let mut agent = Agent::new(connectors, backend, options).with_callback(Arc::new(ProgressCallback));
    agent.init().await?;
    let answer = agent.invoke(prompt).await?;

    println!("{}", answer);
    Ok(())
}

// ============================================================================
// tools / search
// ============================================================================

async fn list_tools(config: &Config) -> anyhow::Result<()> {
    for server in &config.servers {
        print_section(&format!("{} ({} {})", server.name, server.command, server.args.join(" ")));

        let mut connector = McpConnector::from_config(server);
        if let Err(e) = connector.init().await {
            println!("   {} {}", style("✗").red(), e);
            continue;
        }
        for tool in connector.tools() {
            println!("   {} {}", style(&tool.name).green().bold(), style(&tool.description).dim());
        }
        connector.close().await;
    }
    Ok(())
}

async fn search(
    config: &Config,
    query: &str,
    knowledge_dir: Option<PathBuf>,
    top_k: Option<usize>,
) -> anyhow::Result<()> {
    let Some(index) = build_index(config, knowledge_dir).await? else {
        bail!("no knowledge directory configured; pass --knowledge-dir or set KNOWLEDGE_DIR");
    };

    let results = index.search(query, top_k.unwrap_or(config.knowledge.top_k)).await?;
    print_section(&format!("{} result(s) for \"{}\"", results.len(), query));
    for result in results {
        println!("{} {}", style(format!("[{:.4}]", result.score)).cyan(), result.document.trim());
        println!();
    }
    Ok(())
}

// ============================================================================
// metrics / config
// ============================================================================

fn metrics(file: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let bars: Vec<OhlcvBar> =
        serde_json::from_str(&raw).with_context(|| format!("parsing OHLCV bars from {}", file.display()))?;
    let metrics = compute_ohlcv_metrics(&bars);
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

fn init_config(force: bool) -> anyhow::Result<()> {
    let path = config_path();
    if path.exists() && !force {
        bail!("{} already exists; use --force to overwrite", path.display());
    }
    save_config(&Config::default(), &path)?;
    println!("   {} Wrote {}", style("✓").green(), style(path.display()).cyan());
    println!(
        "   {}",
        style("Secrets are read from OPENAI_API_KEY and EMBEDDING_KEY, never from this file").dim()
    );
    Ok(())
}

fn validate() -> anyhow::Result<()> {
    let snapshot = read_config_snapshot(&config_path());
    print_section(&format!("Configuration: {}", snapshot.path.display()));
    for issue in &snapshot.issues {
        println!("   {} {}", style("ℹ").blue(), issue);
    }

    let mut config = snapshot.config.unwrap_or_default();
    apply_env_overrides(&mut config);
    let result = validate_config(&config);

    for warning in &result.warnings {
        println!("   {} {}", style("⚠").yellow(), warning);
    }
    for error in &result.errors {
        println!("   {} {}", style("✗").red(), error);
    }

    if !result.valid {
        bail!("{} configuration error(s)", result.errors.len());
    }
    println!("   {} Configuration is valid", style("✓").green());
    Ok(())
}
