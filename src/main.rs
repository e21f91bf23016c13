//! MediMate AI - conversational medical-guidance API
//!
//! A thin orchestration service: it accepts symptom descriptions (optionally
//! with an image), forwards them to Gemini with the MediMate prompt, persists
//! the exchange in SQLite, and serves the reconstructed chat history.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod conversation;
mod core;
mod providers;
mod routes;

use crate::config::Config;
use crate::core::{MessageStore, SessionRegistry, SqliteStore};
use crate::providers::GeminiResponder;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MessageStore>,
    pub sessions: Arc<SessionRegistry>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medimate_ai=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let store: Arc<dyn MessageStore> = Arc::new(
        SqliteStore::new(&config.data_dir.join("medimate.db"))
            .await
            .map_err(|e| anyhow::anyhow!("failed to initialize message store: {e}"))?,
    );

    let responder = Arc::new(
        GeminiResponder::from_config(&config)
            .map_err(|e| anyhow::anyhow!("failed to initialize AI responder: {e}"))?,
    );

    let state = AppState {
        store: store.clone(),
        sessions: Arc::new(SessionRegistry::new(store, responder)),
    };

    let app = axum::Router::new()
        .merge(routes::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("MediMate AI running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
