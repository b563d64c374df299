//! Response classification shared by the HTTP scorers.

use gradewise_core::ScorerError;

/// Default retry-after when a 429 carries no usable header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

pub(crate) fn send_error(e: reqwest::Error, timeout_ms: u64) -> ScorerError {
    if e.is_timeout() {
        ScorerError::Timeout(timeout_ms)
    } else {
        ScorerError::NetworkError(e.to_string())
    }
}

/// Map an unsuccessful HTTP response to a scorer error. `extract_message`
/// pulls a readable message out of the provider's error body.
pub(crate) async fn status_error(
    response: reqwest::Response,
    extract_message: fn(&str) -> Option<String>,
) -> ScorerError {
    let status = response.status().as_u16();
    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
            * 1000;
        return ScorerError::RateLimited {
            retry_after_ms: retry_after,
        };
    }
    let body = response.text().await.unwrap_or_default();
    if status == 401 || status == 403 {
        return ScorerError::AuthenticationFailed(extract_message(&body).unwrap_or(body));
    }
    ScorerError::ApiError {
        status,
        message: extract_message(&body).unwrap_or(body),
    }
}
