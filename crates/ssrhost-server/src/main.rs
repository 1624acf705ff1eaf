use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ssrhost_core::{ElementTable, Payload};
use ssrhost_server::config::{EngineKind, SsrConfig};
use ssrhost_server::{AppState, build_renderer, build_router, shutdown_signal};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(
    name = "ssrhost",
    version,
    about = "ssrhost: server-side rendering of custom elements through a sandboxed WASM engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the rendered page over HTTP
    Serve {
        #[command(flatten)]
        common: CommonArgs,

        /// Address to listen on (overrides server.listen)
        #[arg(long)]
        listen: Option<String>,
    },
    /// Render once and print the document to stdout
    Render {
        #[command(flatten)]
        common: CommonArgs,

        /// Page markup (overrides page.markup)
        #[arg(long)]
        markup: Option<String>,

        /// Initial state as JSON (overrides page.initial_state)
        #[arg(long)]
        state: Option<String>,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Path to ssrhost.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory of element definitions (overrides elements.dir)
    #[arg(long)]
    elements_dir: Option<PathBuf>,

    /// Engine module path (overrides engine.module)
    #[arg(long)]
    module: Option<PathBuf>,

    /// Engine implementation (overrides engine.kind)
    #[arg(long, value_enum)]
    engine: Option<EngineKind>,
}

impl CommonArgs {
    fn load_config(&self) -> Result<SsrConfig> {
        let (mut config, source) = SsrConfig::load(self.config.as_deref())?;
        match &source {
            Some(path) => tracing::info!(path = %path.display(), "Loaded config"),
            None => tracing::info!("No config file found, using defaults"),
        }

        if let Some(dir) = &self.elements_dir {
            config.elements.dir = dir.clone();
        }
        if let Some(module) = &self.module {
            config.engine.wasm.module = module.clone();
        }
        if let Some(kind) = self.engine {
            config.engine.kind = kind;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `render` output on stdout stays clean
    fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SSRHOST_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { common, listen } => {
            let mut config = common.load_config()?;
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            serve(config).await
        }
        Command::Render {
            common,
            markup,
            state,
        } => {
            let mut config = common.load_config()?;
            if let Some(markup) = markup {
                config.page.markup = markup;
            }
            if let Some(state) = state {
                config.page.initial_state =
                    serde_json::from_str(&state).context("--state is not valid JSON")?;
            }
            render_once(config).await
        }
    }
}

async fn serve(config: SsrConfig) -> Result<()> {
    let elements = Arc::new(ElementTable::from_dir(&config.elements.dir));
    let renderer = build_renderer(&config.engine).await?;
    let state = AppState::new(renderer, elements, config.page);

    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen))?;
    let addr = listener.local_addr()?;

    tracing::info!(%addr, engine = ?config.engine.kind, "Server starting on http://{addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn render_once(config: SsrConfig) -> Result<()> {
    let elements = Arc::new(ElementTable::from_dir(&config.elements.dir));
    let renderer = build_renderer(&config.engine).await?;

    let payload = Payload::new(config.page.markup, elements, config.page.initial_state);
    let result = renderer
        .render(&payload)
        .await
        .context("Failed to render document")?;

    println!("{}", result.document);
    Ok(())
}
