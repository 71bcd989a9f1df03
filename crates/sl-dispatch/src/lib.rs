//! Webhook delivery: payload signing, the HTTP dispatch loop with bounded
//! retries, and the per-stream token-bucket rate limiter.

pub mod dispatcher;
pub mod limiter;
pub mod sign;

pub use dispatcher::{DispatchOptions, DispatchResult, WebhookDispatcher};
pub use limiter::RateLimiter;
pub use sign::{sign_payload, verify_signature, SIGNATURE_HEADER, SIGNATURE_TOLERANCE_SECS};
