//! Shared HTTP plumbing for the remote model providers.
//!
//! [`send_with_retry`] posts a JSON request and decodes a JSON response,
//! retrying transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! `max_retries = 0` means exactly one attempt. Each provider passes the
//! error variant its failures belong to, so a timed-out rerank call becomes
//! [`Error::RerankService`](crate::Error::RerankService) and a timed-out
//! generation call becomes [`Error::Generation`](crate::Error::Generation).

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::Error;

pub(crate) fn client(timeout_secs: u64, make_err: fn(String) -> Error) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| make_err(format!("failed to build HTTP client: {}", e)))
}

/// Send the request built by `request`, retrying up to `max_retries` times.
pub(crate) async fn send_with_retry<T, F>(
    service: &str,
    request: F,
    max_retries: u32,
    make_err: fn(String) -> Error,
) -> Result<T, Error>
where
    T: DeserializeOwned,
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            debug!(service, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        match request().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json::<T>()
                        .await
                        .map_err(|e| make_err(format!("{} response decode: {}", service, e)));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = make_err(format!("{} API error {}: {}", service, status, body_text));
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(service, %status, "transient API failure");
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) if e.is_timeout() => {
                warn!(service, "request timed out");
                last_err = Some(make_err(format!("{} request timed out", service)));
            }
            Err(e) => {
                warn!(service, error = %e, "request failed");
                last_err = Some(make_err(format!("{} request failed: {}", service, e)));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| make_err(format!("{} failed after retries", service))))
}
