//! sl-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, runs migrations,
//! builds the shared state, wires middleware, and starts the HTTP server.
//! All route handlers live under `routes/`; shared state lives in
//! `state.rs`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

use sl_daemon::{routes, state};

#[derive(Parser, Debug)]
#[command(name = "sl-daemon", about = "secondlayer admin API")]
struct Args {
    /// Bind address for the HTTP server.
    #[arg(long, env = "SL_DAEMON_ADDR", default_value = "127.0.0.1:3999")]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sl_config::bootstrap_env();
    let args = Args::parse();
    let config = sl_config::Config::from_env().context("configuration failed")?;
    sl_config::init_tracing(&config);

    let pool = sl_db::connect(&config.database_url).await?;
    sl_db::migrate(&pool).await?;

    let shared = Arc::new(state::AppState::new(pool.clone(), &config));

    // View cache: initial load, then change-notification driven refreshes.
    shared.views.refresh(&pool).await?;
    shared.views.spawn_listener(pool.clone());

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    info!(
        addr = %args.addr,
        dev_mode = config.dev_mode,
        networks = ?config.networks,
        "sl-daemon listening"
    );

    axum::serve(tokio::net::TcpListener::bind(args.addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

/// CORS: allow only localhost origins (the operator dashboard).
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}
