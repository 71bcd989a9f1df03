use std::sync::Arc;

use sqlx::PgPool;

use sl_dispatch::{RateLimiter, WebhookDispatcher};

/// Everything a worker loop needs, passed explicitly rather than global. One
/// context is shared by all loops in a worker process, so the rate-limiter
/// buckets are per-process (fleet rate = workers x per-stream limit).
#[derive(Clone)]
pub struct WorkerContext {
    pub pool: PgPool,
    pub dispatcher: WebhookDispatcher,
    pub limiter: Arc<RateLimiter>,
    pub network: String,
}

impl WorkerContext {
    pub fn new(pool: PgPool, network: String) -> Self {
        Self {
            pool,
            dispatcher: WebhookDispatcher::new(),
            limiter: Arc::new(RateLimiter::new()),
            network,
        }
    }
}
