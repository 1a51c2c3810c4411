//! API server binary.

use std::net::SocketAddr;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use subtitle_api::config::ApiConfig;
use subtitle_api::metrics;
use subtitle_api::routes::build_router;
use subtitle_api::state::AppState;
use subtitle_db::DbConfig;
use subtitle_queue::QueueConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls crypto provider");

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter =
        EnvFilter::from_default_env().add_directive("subtitle=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("starting subtitle-api");

    let config = ApiConfig::from_env();
    let db_config = DbConfig::from_env();
    let queue_config = QueueConfig::from_env();
    let redis_url = queue_config.redis_url.clone();

    info!(host = %config.host, port = config.port, "api config loaded");

    let state = match AppState::new(config.clone(), db_config, queue_config, &redis_url).await {
        Ok(s) => s,
        Err(e) => {
            error!("failed to create application state: {e}");
            std::process::exit(1);
        }
    };

    let prometheus = metrics::init_metrics();
    if config.metrics_enabled {
        info!("prometheus metrics enabled at /metrics");
    }

    let app = build_router(state, prometheus);

    let addr: SocketAddr = config.bind_addr().parse().expect("invalid bind address");
    info!("listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .unwrap();

    info!("server shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
    info!("received shutdown signal");
}
