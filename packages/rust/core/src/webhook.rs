//! Completion-webhook delivery with bounded retry.

use std::time::Duration;

use ingestkit_shared::{IngestError, Result, WebhookConfig};
use tracing::{debug, warn};

use crate::response::BatchResponse;

/// POST the finished batch to `url` as JSON.
///
/// One initial attempt plus up to `max_retries` retries, sleeping a doubling
/// backoff between attempts. Exhaustion abandons the delivery; the batch
/// itself is never re-run.
pub async fn deliver(url: &str, response: &BatchResponse, config: &WebhookConfig) -> Result<()> {
    let client = reqwest::Client::new();
    let mut backoff = Duration::from_millis(config.backoff_ms);
    let attempts = config.max_retries + 1;

    for attempt in 1..=attempts {
        match client.post(url).json(response).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(url, attempt, "webhook delivered");
                return Ok(());
            }
            Ok(resp) => {
                warn!(url, attempt, status = %resp.status(), "webhook rejected");
            }
            Err(e) => {
                warn!(url, attempt, error = %e, "webhook unreachable");
            }
        }
        if attempt < attempts {
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }

    Err(IngestError::Webhook(format!(
        "delivery to {url} abandoned after {attempts} attempts"
    )))
}
