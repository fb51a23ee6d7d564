//! Shared HTTP plumbing for the remote collaborators.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use serde_json::Value;

use crate::error::TransportError;

/// Build a client with a request timeout. Falls back to the default client
/// if the builder fails (e.g. TLS backend initialization).
pub fn client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to build HTTP client, using defaults");
            reqwest::Client::new()
        })
}

/// Send the request produced by `request` until it succeeds, fails with a
/// non-retryable status, or `max_retries` retries are exhausted. Returns the
/// decoded JSON body.
pub async fn send_with_retry<F>(
    service: &'static str,
    max_retries: u32,
    request: F,
) -> Result<Value, TransportError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << (attempt - 1).min(5));
            tracing::debug!(service, attempt, delay_secs = delay.as_secs(), "retrying request");
            tokio::time::sleep(delay).await;
        }

        match request().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| TransportError::invalid(service, e.to_string()));
                }

                let body = response.text().await.unwrap_or_default();
                let err = TransportError::Status {
                    service,
                    status: status.as_u16(),
                    body,
                };
                if !err.is_retryable() {
                    return Err(err);
                }
                tracing::warn!(service, status = status.as_u16(), "transient HTTP error");
                last_err = Some(err);
            }
            Err(e) => {
                tracing::warn!(service, error = %e, "request failed");
                last_err = Some(TransportError::network(service, e));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| TransportError::network(service, "no attempts were made")))
}

/// Send once, no retry. Used where the caller applies its own deadline.
pub async fn send_once(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<Value, TransportError> {
    let response = request
        .send()
        .await
        .map_err(|e| TransportError::network(service, e))?;
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| TransportError::network(service, e))?;
    if !(200..300).contains(&status) {
        return Err(TransportError::Status {
            service,
            status,
            body: text,
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| TransportError::invalid(service, e.to_string()))
}
