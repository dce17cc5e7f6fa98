//! HTTP retry with exponential backoff.
//!
//! Every remote call (Overpass queries, imagery exports) goes through
//! [`send_json`] or [`send_bytes`]. Connection failures, timeouts, HTTP 429
//! and 5xx are retried; any other 4xx fails at once.
//!
//! ```ignore
//! let body = retry::send_json(|| client.post(url).form(&form), retry::DEFAULT_MAX_RETRIES).await?;
//! let tile = retry::send_bytes(|| client.post(url).json(&payload), config.max_retries).await?;
//! ```

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;

use crate::SourceError;

/// Retries after the first attempt. Waits 2s, 4s, 8s, 16s, 32s.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Longest wait between two attempts, including server-sent `Retry-After`.
const MAX_DELAY: Duration = Duration::from_secs(120);

/// Bytes of response body kept in errors and logs.
const BODY_PREVIEW_LEN: usize = 500;

/// How a response status is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Retry,
    Fail,
}

fn classify(status: StatusCode) -> Outcome {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Outcome::Retry
    } else if status.is_client_error() {
        Outcome::Fail
    } else {
        Outcome::Success
    }
}

/// Wait before retry number `attempt` (1-based).
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1_u64 << attempt.min(6)).min(MAX_DELAY)
}

/// Seconds-form `Retry-After`; HTTP dates are ignored.
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    let seconds = response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()?;
    Some(Duration::from_secs(seconds).min(MAX_DELAY))
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}

/// Sends the request built by `build_request` and parses the body as JSON.
///
/// `build_request` runs once per attempt because a
/// [`reqwest::RequestBuilder`] is consumed by `send()`.
///
/// # Errors
///
/// Returns [`SourceError::Http`] on a transport failure that outlived
/// the retries, [`SourceError::Status`] on a failing status, and
/// [`SourceError::Json`] if the body is not JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    build_request: F,
    max_retries: u32,
) -> Result<serde_json::Value, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_with_retries(&build_request, max_retries).await?;
    let url = response.url().clone();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        log::error!(
            "{url}: {} byte body is not JSON ({e}): {}",
            text.len(),
            preview(&text)
        );
        SourceError::Json(e)
    })
}

/// Like [`send_json`] but returns the body unparsed, for binary payloads
/// such as GeoTIFF tiles.
///
/// # Errors
///
/// Same as [`send_json`], minus JSON parsing.
#[allow(clippy::future_not_send)]
pub async fn send_bytes<F>(build_request: F, max_retries: u32) -> Result<Vec<u8>, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_with_retries(&build_request, max_retries).await?;
    Ok(response.bytes().await?.to_vec())
}

#[allow(clippy::future_not_send)]
async fn send_with_retries<F>(
    build_request: &F,
    max_retries: u32,
) -> Result<reqwest::Response, SourceError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let wait = match build_request().send().await {
            Ok(response) => {
                let status = response.status();
                match classify(status) {
                    Outcome::Success => return Ok(response),
                    Outcome::Retry if attempt < max_retries => {
                        let wait = retry_after(&response).unwrap_or_else(|| backoff(attempt + 1));
                        log::warn!("HTTP {status} from {}", response.url());
                        wait
                    }
                    Outcome::Retry | Outcome::Fail => {
                        let body = response.text().await.unwrap_or_default();
                        return Err(SourceError::Status {
                            status: status.as_u16(),
                            body: preview(&body),
                        });
                    }
                }
            }
            Err(e) if is_transient(&e) && attempt < max_retries => {
                log::warn!("Transient HTTP error: {e}");
                backoff(attempt + 1)
            }
            Err(e) => return Err(SourceError::Http(e)),
        };

        attempt += 1;
        log::warn!("Retry {attempt}/{max_retries} in {wait:?}");
        tokio::time::sleep(wait).await;
    }
}

/// Cuts `text` to [`BODY_PREVIEW_LEN`] bytes on a char boundary.
fn preview(text: &str) -> String {
    if text.len() <= BODY_PREVIEW_LEN {
        return text.to_string();
    }
    let mut end = BODY_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_retried() {
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS), Outcome::Retry);
        assert_eq!(classify(StatusCode::BAD_GATEWAY), Outcome::Retry);
        assert_eq!(classify(StatusCode::BAD_REQUEST), Outcome::Fail);
        assert_eq!(classify(StatusCode::FORBIDDEN), Outcome::Fail);
        assert_eq!(classify(StatusCode::OK), Outcome::Success);
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff(1), Duration::from_secs(2));
        assert_eq!(backoff(3), Duration::from_secs(8));
        assert_eq!(backoff(6), Duration::from_secs(64));
        assert_eq!(backoff(30), Duration::from_secs(64));
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(400);
        let p = preview(&long);
        assert!(p.ends_with("..."));
        assert!(p.len() <= BODY_PREVIEW_LEN + 3);
        assert_eq!(preview("short"), "short");
    }
}
