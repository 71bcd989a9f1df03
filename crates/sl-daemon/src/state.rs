//! Shared runtime state for sl-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum; this module owns
//! nothing async itself.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::broadcast;

use sl_limits::PlanLimits;
use sl_views::ViewCache;

/// Messages broadcast over the internal event bus and surfaced as SSE
/// events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    JobsEnqueued { stream_id: String, count: u64 },
    LogLine { level: String, msg: String },
}

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub views: ViewCache,
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub limits: PlanLimits,
    pub dev_mode: bool,
    pub networks: Vec<String>,
    pub indexer_url: Option<String>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(pool: PgPool, config: &sl_config::Config) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        Self {
            pool,
            views: ViewCache::new(),
            bus,
            build: BuildInfo {
                service: "sl-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            limits: PlanLimits::default(),
            dev_mode: config.dev_mode,
            networks: config.networks.clone(),
            indexer_url: config.indexer_url.clone(),
            http: reqwest::Client::new(),
        }
    }

    pub fn log_line(&self, level: &str, msg: impl Into<String>) {
        let _ = self.bus.send(BusMsg::LogLine {
            level: level.to_string(),
            msg: msg.into(),
        });
    }
}

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

pub type SharedState = Arc<AppState>;
