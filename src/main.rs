use clap::{Parser, Subcommand};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod agent;
mod error;
mod models;
mod provider;
mod server;
mod session;
mod settings;
mod sources;

use agent::tools::ToolCatalog;
use provider::mcp::{serve_stdio, StdioLauncher};
use provider::{Launcher, LocalLauncher};
use session::Session;
use settings::{resolve_effective_settings, EffectiveSettings, EnvConfig, GlobalConfigDefaults, RequestOverrides};
use sources::render::{HttpRenderer, Renderer};

#[derive(Debug, Parser)]
#[command(name = "price_scout")]
#[command(about = "Finds the cheapest listing for a product across Pakistani online stores", long_about = None)]
struct Cli {
    /// JSON file with default settings.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    model: Option<String>,
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Run the scrapers inside this process instead of a `serve-tools` child.
    #[arg(long, global = true)]
    in_process: bool,
    /// Expose Prometheus metrics on this address.
    #[arg(long, global = true)]
    metrics_listen: Option<SocketAddr>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Answer a single question and exit.
    Ask { query: String },
    /// Read questions from stdin, one per line, in one conversation.
    Chat,
    Start {
        #[arg(long, default_value = "127.0.0.1:7171")]
        listen: String,
    },
    /// Serve the product tools over MCP on stdin/stdout.
    ServeTools,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if matches!(cli.command, Commands::ServeTools) {
        fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    } else {
        fmt().with_env_filter(EnvFilter::from_default_env()).init();
    }

    if let Some(addr) = cli.metrics_listen {
        metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!(%addr, "metrics exporter listening");
    }

    let global = match &cli.config {
        Some(path) => GlobalConfigDefaults::load(path)?,
        None => GlobalConfigDefaults::default(),
    };
    let request = RequestOverrides { model: cli.model.clone(), base_url: cli.base_url.clone(), ..RequestOverrides::default() };
    let settings = resolve_effective_settings(&global, &EnvConfig::from_env(), &request);

    match &cli.command {
        Commands::ServeTools => {
            serve_stdio(build_catalog(&settings)?).await?;
        }
        Commands::Ask { query } => {
            let mut session = build_session(&cli, &settings)?;
            println!("{}", ask_once(&mut session, query).await?);
        }
        Commands::Chat => {
            let mut session = build_session(&cli, &settings)?;
            let result = chat(&mut session).await;
            if let Err(e) = session.close().await {
                warn!(error = %e, "closing session failed");
            }
            result?;
        }
        Commands::Start { listen } => {
            let addr: SocketAddr = listen.parse()?;
            let session = build_session(&cli, &settings)?;
            server::serve(addr, server::AppState::new(session)).await?;
        }
    }
    Ok(())
}

fn build_catalog(settings: &EffectiveSettings) -> anyhow::Result<ToolCatalog> {
    let renderer: Arc<dyn Renderer> = Arc::new(HttpRenderer::new(settings.sources.user_agent.clone(), settings.sources.request_timeout));
    let sources = sources::default_sources(renderer, &settings.sources)?;
    Ok(ToolCatalog::with_sources(sources))
}

fn build_session(cli: &Cli, settings: &EffectiveSettings) -> anyhow::Result<Session> {
    if settings.api_key.is_none() {
        warn!("no GOOGLE_API_KEY or OPENAI_API_KEY set; model calls will likely be rejected");
    }
    let launcher: Arc<dyn Launcher> = if cli.in_process {
        Arc::new(LocalLauncher::new(build_catalog(settings)?))
    } else {
        let mut args = Vec::new();
        if let Some(path) = &cli.config {
            args.push("--config".to_string());
            args.push(path.display().to_string());
        }
        args.push("serve-tools".to_string());
        Arc::new(StdioLauncher::new(std::env::current_exe()?, args))
    };
    let model = Arc::new(models::OpenAICompatible::from_settings(settings)?);
    Ok(Session::new(launcher, model, settings.limits.clone()))
}

/// One question, then shut the provider down. A failing shutdown is logged so
/// it never hides an answer.
async fn ask_once(session: &mut Session, query: &str) -> Result<String, error::ScoutError> {
    let answer = session.ask(query).await;
    if let Err(e) = session.close().await {
        warn!(error = %e, "closing session failed");
    }
    answer
}

async fn chat(session: &mut Session) -> anyhow::Result<()> {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else { break };
        let line = line.trim();
        if matches!(line, "exit" | "quit") {
            break;
        }
        if line.is_empty() {
            continue;
        }
        match session.ask(line).await {
            Ok(answer) => println!("{answer}"),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}
