//! Event photo voting service.
//!
//! # Flow
//! - Organizer creates an event with a name and the number of expected participants
//! - Service answers with a join link and writes a QR code PNG encoding it
//! - Participants open the link, register with a name and an optional photo
//! - A signed `sid` cookie ties the browser to its registration, one per event
//! - Clients poll `/e/{id}/status`, voting opens once enough participants joined
//! - Every participant casts exactly one vote for someone else in the event
//! - `/results/{id}` stays pending until `min(joined, max(expected, 1))` votes are in
//!
//! # Photos
//! Uploads are normalized to upright RGB JPEGs and served from `/u`.
//! QR codes are served from `/qr`. Both with a 5 minute public cache.
//!
//! # Setup
//!
//! Run against a local Redis.
//! ```sh
//! REDIS_URL=redis://127.0.0.1:6379 cargo run -p photovote
//! ```
//!
//! Run without Redis, everything is lost on restart.
//! ```sh
//! STORE_BACKEND=memory cargo run -p photovote
//! ```
//!
//! Create an event from the command line.
//! ```sh
//! cargo run -p admin -- create "Summer party" 12
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{
        HeaderValue, Method,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{fs, net::TcpListener, signal};
use tower_http::{cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod error;
pub mod events;
pub mod photos;
pub mod qr;
pub mod routes;
pub mod session;
pub mod state;

use config::Config;
use routes::{
    ballot_handler, create_event_handler, health_handler, index_handler, join_handler,
    join_view_handler, results_handler, status_handler, vote_handler,
};
use state::AppState;

pub const STATIC_CACHE_CONTROL: &str = "public, max-age=300";

pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let files = Router::new()
        .nest_service("/u", ServeDir::new(&state.config.upload_dir))
        .nest_service("/qr", ServeDir::new(&state.config.qr_dir))
        .layer(SetResponseHeaderLayer::if_not_present(
            CACHE_CONTROL,
            HeaderValue::from_static(STATIC_CACHE_CONTROL),
        ));

    Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(health_handler))
        .route("/admin/create", post(create_event_handler))
        .route(
            "/e/{event_id}/join",
            get(join_view_handler).post(join_handler),
        )
        .route("/e/{event_id}/status", get(status_handler))
        .route("/e/{event_id}/vote", get(ballot_handler).post(vote_handler))
        .route("/results/{event_id}", get(results_handler))
        .merge(files)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(cors)
        .with_state(state)
}

pub async fn prepare_dirs(config: &Config) -> anyhow::Result<()> {
    for dir in [&config.upload_dir, &config.qr_dir] {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    Ok(())
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;
    prepare_dirs(&config).await?;

    info!("Initializing state...");
    let state = AppState::new(config).await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
