//! Shared HTTP client construction and retry with exponential backoff.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;

pub fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("docent/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Non-success HTTP status with the response body, for callers that need
/// to tell throttling apart from bad requests.
#[derive(Debug)]
pub struct StatusError {
    pub service: &'static str,
    pub status: reqwest::StatusCode,
    pub body: String,
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} API error {}: {}", self.service, self.status, self.body)
    }
}

impl std::error::Error for StatusError {}

/// Throttling, server errors and transport failures are worth retrying.
/// Other 4xx responses are not.
pub fn is_transient(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<StatusError>() {
        Some(e) => e.status.as_u16() == 429 || e.status.is_server_error(),
        None => true,
    }
}

/// Runs `op` until it succeeds or `max_retries` retries are spent.
///
/// The delay before retry `n` (1-based) is `base_ms · 2^(n-1)`.
pub async fn with_retry<T, F, Fut>(max_retries: u32, base_ms: u64, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_if(max_retries, base_ms, |_| true, op).await
}

/// [`with_retry`] that stops early on errors `retry` rejects.
pub async fn with_retry_if<T, F, Fut, R>(max_retries: u32, base_ms: u64, retry: R, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    R: Fn(&anyhow::Error) -> bool,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_retries || !retry(&e) => return Err(e),
            Err(e) => {
                let delay = base_ms.saturating_mul(1 << attempt.min(16));
                tracing::debug!(attempt, delay_ms = delay, error = %e, "retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
        }
    }
}

/// Byte-safe prefix of at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, 1, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                anyhow::bail!("transient {}", n)
            }
            Ok(n)
        })
        .await
        .unwrap();
        assert_eq!(result, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(2, 1, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("always")
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry_if(3, 1, is_transient, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StatusError {
                service: "test",
                status: reqwest::StatusCode::BAD_REQUEST,
                body: "bad".into(),
            }
            .into())
        })
        .await;
        assert_eq!(result.unwrap_err().to_string(), "test API error 400 Bad Request: bad");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transient_classification() {
        let throttled = anyhow::Error::from(StatusError {
            service: "test",
            status: reqwest::StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        });
        assert!(is_transient(&throttled));
        assert!(is_transient(&anyhow::anyhow!("connection reset")));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("가나다라", 2), "가나");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
