use axum::{
    Router,
    routing::{get, post},
};

use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_http::trace::{TraceLayer, DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, DefaultOnFailure};

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pgsession::{config::Config, handlers, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    let app = Router::new()
        .route("/api/session", get(handlers::demo::show_session))
        .route("/api/session/logout", post(handlers::demo::logout))
        .with_state(state.clone())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new());

    if config.cleanup_interval_secs > 0 {
        let cleanup_store = state.store.clone();
        let interval = Duration::from_secs(config.cleanup_interval_secs);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                tracing::info!("🧹 Running scheduled cleanup of expired sessions...");
                match cleanup_store.cleanup_expired().await {
                    Ok(removed) => {
                        tracing::info!("✅ Cleanup job completed: {} session(s) removed", removed);
                    }
                    Err(e) => {
                        tracing::error!("❌ Cleanup job failed: {}", e);
                    }
                }
            }
        });
        tracing::info!("✅ Background cleanup job started (every {}s)", config.cleanup_interval_secs);
    }

    tracing::info!("🚀 Server listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
