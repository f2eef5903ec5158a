//! Retry policy + retryable HTTP executor (spec.md §4.1).

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use reqwest::{Response, StatusCode};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
            backoff_factor: 2.0,
            jitter: 0.2,
        }
    }
}

/// Status codes spec.md §4.1 classifies as retryable.
pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        429 | 500 | 502 | 503 | 504
    )
}

impl RetryPolicy {
    /// Base delay before attempt `attempt + 1` (0-indexed), absent a
    /// `Retry-After` header, with multiplicative jitter applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jittered = apply_jitter(capped, self.jitter);
        Duration::from_secs_f64(jittered.max(0.0))
    }

    /// Delay for attempt `attempt`, honoring a `Retry-After` header if
    /// present and within `(0, max_delay]`.
    pub fn delay_for_response(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        match retry_after {
            Some(secs) if secs > 0 && Duration::from_secs(secs) <= self.max_delay => {
                Duration::from_secs(secs)
            }
            _ => self.delay_for_attempt(attempt),
        }
    }
}

fn apply_jitter(value: f64, jitter: f64) -> f64 {
    let low = 1.0 - jitter;
    let high = 1.0 + jitter;
    let factor = rand::thread_rng().gen_range(low..=high);
    value * factor
}

/// Extracts an integer-seconds `Retry-After` value from a response, if present.
pub fn retry_after_seconds(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error("request failed after exhausting retries: {0}")]
    MaxRetriesExceeded(String),
    #[error("request cancelled")]
    Cancelled,
}

/// Runs `attempt` up to `policy.max_retries + 1` times, retrying on
/// network errors and on [`is_retryable_status`] responses. `attempt` must
/// rebuild its request body from a replayable source each call.
///
/// `cancelled` is polled before each backoff wait; if it resolves first,
/// [`RetryError::Cancelled`] is returned immediately (spec.md §4.1,
/// "If context cancellation fires while waiting, cancellation is returned
/// immediately").
pub async fn execute_with_retry<F, Fut>(
    policy: &RetryPolicy,
    cancelled: impl Future<Output = ()>,
    mut attempt: F,
) -> Result<Response, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Response, reqwest::Error>>,
{
    tokio::pin!(cancelled);
    let mut last_err: Option<String> = None;
    let mut last_response: Option<Response> = None;

    for k in 0..=policy.max_retries {
        let result = attempt().await;
        match result {
            Ok(response) => {
                if !is_retryable_status(response.status()) {
                    return Ok(response);
                }
                let retry_after = retry_after_seconds(&response);
                last_response = Some(response);
                if k == policy.max_retries {
                    break;
                }
                let delay = policy.delay_for_response(k, retry_after);
                if wait_or_cancel(delay, &mut cancelled).await.is_err() {
                    return Err(RetryError::Cancelled);
                }
            }
            Err(e) => {
                last_err = Some(e.to_string());
                if k == policy.max_retries {
                    break;
                }
                let delay = policy.delay_for_attempt(k);
                if wait_or_cancel(delay, &mut cancelled).await.is_err() {
                    return Err(RetryError::Cancelled);
                }
            }
        }
    }

    if let Some(response) = last_response {
        return Ok(response);
    }
    Err(RetryError::MaxRetriesExceeded(
        last_err.unwrap_or_else(|| "unknown error".to_string()),
    ))
}

async fn wait_or_cancel(
    delay: Duration,
    cancelled: &mut (impl Future<Output = ()> + Unpin),
) -> Result<(), ()> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = cancelled => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(10), policy.max_delay);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 0..5 {
            let base = (policy.initial_delay.as_secs_f64()
                * policy.backoff_factor.powi(attempt as i32))
            .min(policy.max_delay.as_secs_f64());
            let low = base * (1.0 - policy.jitter);
            let high = base * (1.0 + policy.jitter);
            for _ in 0..50 {
                let got = policy.delay_for_attempt(attempt).as_secs_f64();
                assert!(got >= low - 1e-9 && got <= high + 1e-9, "{got} not in [{low},{high}]");
            }
        }
    }

    #[test]
    fn retry_after_is_used_verbatim_when_in_range() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_response(0, Some(1)), Duration::from_secs(1));
        assert_eq!(policy.delay_for_response(3, Some(10)), Duration::from_secs(10));
    }

    #[test]
    fn retry_after_out_of_range_falls_back_to_backoff() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        // Zero and > max_delay are both out of range.
        assert_eq!(policy.delay_for_response(0, Some(0)), policy.delay_for_attempt(0));
        assert_eq!(
            policy.delay_for_response(0, Some(1000)),
            policy.delay_for_attempt(0)
        );
    }

    #[test]
    fn retryable_statuses_match_spec() {
        for code in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
        for code in [200, 201, 204, 400, 403, 404] {
            assert!(!is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_2xx() {
        let mut server = mockito::Server::new_async().await;
        let m = server.mock("GET", "/ok").with_status(200).create_async().await;
        let client = reqwest::Client::new();
        let url = format!("{}/ok", server.url());
        let policy = RetryPolicy::default();
        let never = std::future::pending::<()>();
        let result = execute_with_retry(&policy, never, || {
            let client = client.clone();
            let url = url.clone();
            async move { client.get(&url).send().await }
        })
        .await
        .unwrap();
        assert_eq!(result.status(), 200);
        m.assert_async().await;
    }

    #[tokio::test]
    async fn retries_503_then_succeeds_honoring_retry_after() {
        let mut server = mockito::Server::new_async().await;
        let m1 = server
            .mock("GET", "/flaky")
            .with_status(503)
            .with_header("Retry-After", "1")
            .expect(1)
            .create_async()
            .await;
        let m2 = server
            .mock("GET", "/flaky")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let client = reqwest::Client::new();
        let url = format!("{}/flaky", server.url());
        let policy = RetryPolicy::default();
        let never = std::future::pending::<()>();
        let started = std::time::Instant::now();
        let result = execute_with_retry(&policy, never, || {
            let client = client.clone();
            let url = url.clone();
            async move { client.get(&url).send().await }
        })
        .await
        .unwrap();
        assert_eq!(result.status(), 200);
        assert!(started.elapsed() >= Duration::from_millis(950));
        m1.assert_async().await;
        m2.assert_async().await;
    }

    #[tokio::test]
    async fn exhausting_retries_returns_last_response() {
        let mut server = mockito::Server::new_async().await;
        let policy = RetryPolicy {
            max_retries: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        let m = server
            .mock("GET", "/always-503")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;
        let client = reqwest::Client::new();
        let url = format!("{}/always-503", server.url());
        let never = std::future::pending::<()>();
        let result = execute_with_retry(&policy, never, || {
            let client = client.clone();
            let url = url.clone();
            async move { client.get(&url).send().await }
        })
        .await
        .unwrap();
        assert_eq!(result.status(), 503);
        m.assert_async().await;
    }
}
