mod config;
mod server;
mod sessions;

use anyhow::Context;
use clap::Parser;
use config::{Cli, EmbedderKind};
use docchat_core::{
    CharacterNgramEmbedder, CompletionService, DocumentIngestor, Embedder, LopdfExtractor,
    OpenAiChat, OpenAiEmbedder, Responder, SessionController,
};
use server::AppState;
use sessions::{CookieSettings, SessionRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    if let Err(error) = dotenv::dotenv() {
        if !error.not_found() {
            eprintln!("ignoring unreadable .env file: {error}");
        }
    }

    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let chunking = cli.chunking();
    chunking.validate().context("invalid chunking options")?;

    let openai = cli.openai();
    let embedder: Arc<dyn Embedder> = match cli.embedder {
        EmbedderKind::Openai => Arc::new(
            OpenAiEmbedder::new(&openai).context("failed to configure the embedding client")?,
        ),
        EmbedderKind::Ngram => Arc::new(CharacterNgramEmbedder::default()),
    };
    let completion: Arc<dyn CompletionService> =
        Arc::new(OpenAiChat::new(&openai).context("failed to configure the chat client")?);

    let controller = SessionController::new(
        DocumentIngestor::new(Arc::new(LopdfExtractor), chunking),
        embedder,
        cli.index(),
        Responder::new(completion, cli.retrieval()),
        cli.policy(),
    );

    let state = AppState {
        controller,
        sessions: SessionRegistry::default(),
        auth: cli.authenticator().await,
        cookie: CookieSettings {
            name: cli.cookie_name.clone(),
            max_age: cli.cookie_max_age(),
            secure: cli.secure_cookie,
        },
    };

    let idle = Duration::from_secs(cli.session_idle_minutes.max(1) * 60);
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = sessions.evict_idle(idle).await;
            if evicted > 0 {
                info!(evicted, "dropped idle sessions");
            }
        }
    });

    let max_upload_bytes = cli.max_upload_mb.max(1).saturating_mul(1024 * 1024);
    let app = server::router(state, max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;
    info!(
        version = app_version,
        bind = %cli.bind,
        embedder = ?cli.embedder,
        chat_model = %cli.chat_model,
        auth = cli.auth,
        "docchat server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("docchat server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for shutdown signal");
    }
}
