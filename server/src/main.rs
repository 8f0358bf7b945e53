use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tutorboard_server::config::ServerConfig;
use tutorboard_server::engine::registry::SessionRegistry;
use tutorboard_server::web::app_state::AppState;
use tutorboard_server::web::router::build_router;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::load("tutorboard.toml");

    let registry = Arc::new(SessionRegistry::new(chrono::Duration::hours(
        config.sessions.retention_hours,
    )));

    // Periodic sweep of sessions idle past the retention threshold.
    let shutdown = CancellationToken::new();
    let sweep_registry = registry.clone();
    let sweep_token = shutdown.clone();
    let sweep_period = Duration::from_secs(config.sessions.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_period);
        // The first tick completes immediately; skip it so the first sweep
        // happens one full period after startup.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = sweep_registry.evict_stale(Utc::now());
                    if evicted > 0 {
                        info!(evicted, "housekeeping sweep evicted inactive sessions");
                    }
                }
                _ = sweep_token.cancelled() => break,
            }
        }
    });

    let app_state = Arc::new(AppState {
        registry,
        public_url: config.server.public_url.clone(),
    });
    let app = build_router(app_state);

    info!("Tutorboard session server starting — Web: {}", config.server.web_address);

    let listener = tokio::net::TcpListener::bind(&config.server.web_address)
        .await
        .expect("failed to bind web listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.cancel();
        })
        .await
        .expect("server error");
}
