use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::sign::{sign_payload, SIGNATURE_HEADER};

pub const USER_AGENT: &str = "Second-Layer/1.0";

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub max_attempts: u32,
    pub timeout_ms: u64,
    pub retry_delays_ms: Vec<u64>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_ms: 10_000,
            retry_delays_ms: vec![1_000, 5_000, 10_000],
        }
    }
}

impl DispatchOptions {
    /// Delay before the attempt after `attempt` (1-based). Attempts past the
    /// schedule reuse its last element.
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let idx = (attempt as usize - 1).min(self.retry_delays_ms.len().saturating_sub(1));
        Duration::from_millis(self.retry_delays_ms.get(idx).copied().unwrap_or(0))
    }
}

#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub success: bool,
    pub status_code: Option<u16>,
    /// Elapsed time of the final attempt.
    pub response_time_ms: u64,
    pub attempts: u32,
    pub error: Option<String>,
}

/// HTTP webhook delivery with bounded retries.
///
/// Outcome classification: 2xx succeeds, 4xx is a permanent endpoint
/// rejection (no retry), 5xx and transport errors retry after the configured
/// delay schedule. At-least-once is the contract: callers must tolerate a
/// receiver seeing the same payload twice.
#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    client: reqwest::Client,
}

impl Default for WebhookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookDispatcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub async fn dispatch(
        &self,
        url: &str,
        payload: &Value,
        secret: Option<&str>,
        opts: &DispatchOptions,
    ) -> DispatchResult {
        // Sign the exact bytes that go on the wire.
        let body = payload.to_string();
        let max_attempts = opts.max_attempts.max(1);

        let mut last_status: Option<u16> = None;
        let mut last_error: Option<String> = None;
        let mut last_elapsed_ms: u64 = 0;

        for attempt in 1..=max_attempts {
            let mut request = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .header("User-Agent", USER_AGENT)
                .timeout(Duration::from_millis(opts.timeout_ms))
                .body(body.clone());

            if let Some(secret) = secret {
                let signature = sign_payload(secret, Utc::now().timestamp(), &body);
                request = request.header(SIGNATURE_HEADER, signature);
            }

            let started = tokio::time::Instant::now();
            let outcome = request.send().await;
            last_elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(resp) => {
                    let status = resp.status();
                    last_status = Some(status.as_u16());

                    if status.is_success() {
                        return DispatchResult {
                            success: true,
                            status_code: last_status,
                            response_time_ms: last_elapsed_ms,
                            attempts: attempt,
                            error: None,
                        };
                    }

                    last_error = Some(format!("HTTP {}", status.as_u16()));

                    if status.is_client_error() {
                        // The attempt reached the endpoint and was rejected;
                        // retrying cannot change the answer.
                        debug!(%url, status = status.as_u16(), "permanent webhook rejection");
                        return DispatchResult {
                            success: false,
                            status_code: last_status,
                            response_time_ms: last_elapsed_ms,
                            attempts: attempt,
                            error: last_error,
                        };
                    }
                }
                Err(e) => {
                    last_status = e.status().map(|s| s.as_u16());
                    last_error = Some(if e.is_timeout() {
                        format!("timed out after {}ms", opts.timeout_ms)
                    } else {
                        e.to_string()
                    });
                }
            }

            if attempt < max_attempts {
                let delay = opts.delay_after_attempt(attempt);
                warn!(
                    %url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = last_error.as_deref().unwrap_or(""),
                    "webhook attempt failed; retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }

        DispatchResult {
            success: false,
            status_code: last_status,
            response_time_ms: last_elapsed_ms,
            attempts: max_attempts,
            error: last_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_schedule_clamps_to_last_element() {
        let opts = DispatchOptions::default();
        assert_eq!(opts.delay_after_attempt(1), Duration::from_millis(1_000));
        assert_eq!(opts.delay_after_attempt(2), Duration::from_millis(5_000));
        assert_eq!(opts.delay_after_attempt(3), Duration::from_millis(10_000));
        // Past the schedule: clamp, don't panic.
        assert_eq!(opts.delay_after_attempt(7), Duration::from_millis(10_000));
    }

    #[test]
    fn empty_schedule_means_no_delay() {
        let opts = DispatchOptions {
            retry_delays_ms: vec![],
            ..DispatchOptions::default()
        };
        assert_eq!(opts.delay_after_attempt(1), Duration::from_millis(0));
    }
}
