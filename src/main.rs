//! # Code Agent CLI (`code-agent`)
//!
//! ## Usage
//!
//! ```bash
//! code-agent                       # interactive chat over ./workspace
//! code-agent --index               # index ./workspace into the vector store
//! code-agent --config ./config/agent.toml --workspace ../repo
//! ```
//!
//! Secrets come from the environment (a `.env.local` file is loaded first):
//! `ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, `BRAVE_API_KEY`, `QDRANT_API_KEY`.
//! `QDRANT_URL` and `QDRANT_COLLECTION_NAME` override the config file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use code_agent::agent::{Agent, Console};
use code_agent::config::{self, Config, Secrets};
use code_agent::embedding::{self, EmbeddingProvider};
use code_agent::error::AgentError;
use code_agent::index::Indexer;
use code_agent::llm::AnthropicClient;
use code_agent::progress::ProgressMode;
use code_agent::retrieval::ContextRetriever;
use code_agent::sandbox::Sandbox;
use code_agent::tools::{ToolDeps, ToolRegistry, VectorBackend};
use code_agent::vector_store::{self, VectorStore};
use code_agent::web_search::{BraveClient, WebSearchProvider};

/// Grace period between an interrupt and a forced exit.
const FORCE_EXIT_AFTER: Duration = Duration::from_millis(500);

/// Code Agent: chat with an LLM that can read, edit and search your workspace.
#[derive(Parser)]
#[command(name = "code-agent", version)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, default_value = "./config/agent.toml")]
    config: PathBuf,

    /// Index the workspace for vector search, then exit.
    #[arg(long)]
    index: bool,

    /// Workspace directory (overrides `workspace.root`).
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Indexing progress on stderr. Defaults to human when stderr is a TTY.
    #[arg(long, value_enum)]
    progress: Option<ProgressMode>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_loaded = dotenvy::from_filename(".env.local");
    init_tracing();
    if env_loaded.is_err() {
        tracing::info!("no .env.local file, using environment variables directly");
    }

    let cli = Cli::parse();
    let mut cfg = config::load_config(&cli.config)?.with_env_overrides();
    if let Some(workspace) = cli.workspace.clone() {
        cfg.workspace.root = workspace;
    }
    let secrets = Secrets::from_env();
    tracing::debug!(?secrets, "loaded credentials");

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let sandbox = Sandbox::new(&cfg.workspace.root)
        .with_context(|| format!("Failed to prepare workspace {}", cfg.workspace.root.display()))?;

    if cli.index {
        let progress = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);
        return run_index(&cfg, &secrets, &sandbox, progress, cancel).await;
    }
    run_chat(cfg, &secrets, sandbox, cancel).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel on Ctrl-C or SIGTERM, then force-exit if shutdown stalls (a
/// pending stdin read cannot be aborted).
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        println!("\nReceived interrupt signal, shutting down...");
        cancel.cancel();
        tokio::time::sleep(FORCE_EXIT_AFTER).await;
        std::process::exit(0);
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn open_store(cfg: &Config, secrets: &Secrets) -> anyhow::Result<Option<Arc<dyn VectorStore>>> {
    vector_store::create_store(&cfg.vector_store, cfg.embedding.dims, secrets)
        .await
        .context(
            "Error initializing vector store (set vector_store.backend to \"memory\" or \"disabled\" to run without one)",
        )
}

async fn run_index(
    cfg: &Config,
    secrets: &Secrets,
    sandbox: &Sandbox,
    progress: ProgressMode,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let Some(embedder) = embedding::create_provider(&cfg.embedding, secrets)
        .context("Cannot perform indexing without a valid embedding provider")?
    else {
        bail!("Cannot perform indexing: embedding provider is disabled");
    };
    let Some(store) = open_store(cfg, secrets).await? else {
        bail!("Cannot perform indexing: vector store is disabled");
    };

    let indexer = Indexer::new(embedder, store, cfg.indexing.clone()).with_progress(progress.reporter());
    let report = match indexer.index_directory(sandbox.root(), &cancel).await {
        Ok(report) => report,
        Err(code_agent::error::IndexError::Cancelled) => {
            println!("\nGoodbye!");
            return Ok(());
        }
        Err(e) => return Err(e).context("Error during indexing"),
    };

    for skipped in &report.skipped {
        tracing::info!(file = %skipped.path, reason = %skipped.reason, "skipped");
    }
    println!(
        "Indexed {} snippets from {} files in {} batches ({} skipped).",
        report.snippets,
        report.files_seen,
        report.batches,
        report.skipped.len()
    );
    Ok(())
}

async fn run_chat(
    cfg: Config,
    secrets: &Secrets,
    sandbox: Sandbox,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let Some(api_key) = secrets.anthropic_api_key.clone() else {
        bail!("ANTHROPIC_API_KEY environment variable not set");
    };
    let llm = Arc::new(AnthropicClient::new(&cfg.llm, api_key));

    let embedder: Option<Arc<dyn EmbeddingProvider>> =
        match embedding::create_provider(&cfg.embedding, secrets) {
            Ok(embedder) => embedder,
            Err(e) => {
                tracing::warn!(error = %e, "embeddings unavailable, context retrieval and vector tools disabled");
                None
            }
        };
    let store = open_store(&cfg, secrets).await?;

    let web: Option<Arc<dyn WebSearchProvider>> =
        match (cfg.web_search.provider.as_str(), secrets.brave_api_key.clone()) {
            ("brave", Some(key)) => Some(Arc::new(BraveClient::new(&cfg.web_search, key))),
            ("brave", None) => {
                tracing::warn!("BRAVE_API_KEY not set, search_web disabled");
                None
            }
            _ => None,
        };

    let (retriever, vector) = match (embedder, store) {
        (Some(embedder), Some(store)) => {
            let retriever = cfg.retrieval.enabled.then(|| {
                ContextRetriever::new(
                    embedder.clone(),
                    store.clone(),
                    cfg.retrieval.top_k,
                    cfg.retrieval.context_budget,
                )
            });
            (retriever, Some(VectorBackend { embedder, store }))
        }
        _ => (None, None),
    };

    let tools = Arc::new(ToolRegistry::with_builtins(ToolDeps {
        sandbox,
        web,
        vector,
        config: cfg.tools.clone(),
    }));
    tracing::info!(tools = tools.len(), retrieval = retriever.is_some(), "agent ready");

    let mut agent = Agent::new(llm, tools, retriever);
    let mut console = Console::new();
    match agent.run(&mut console, cancel).await {
        Ok(()) | Err(AgentError::Cancelled) => {
            println!("\nGoodbye!");
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
