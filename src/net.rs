//! Blocking HTTP client with a bounded exponential-backoff retry policy

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use tracing::warn;

/// Retry transient failures: a fixed number of attempts with doubling backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first request
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub retry_statuses: &'static [u16],
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            retry_statuses: &[429, 500, 502, 503, 504],
        }
    }
}

impl RetryPolicy {
    pub fn should_retry_status(&self, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status.as_u16())
    }

    pub fn should_retry_error(&self, err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect()
    }

    /// Wait before attempt `attempt + 1` (attempts are 1-based): 1s, 2s, 4s, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Body and final location of a fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub status: StatusCode,
    pub body: String,
}

pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(user_agent: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, retry })
    }

    /// GET `url`, following redirects, retrying per the policy.
    ///
    /// A retryable status that persists through the last attempt is returned
    /// as a normal response, not an error.
    pub fn get(&self, url: &str) -> Result<FetchedPage> {
        let mut attempt = 1;
        loop {
            let retries_left = attempt < self.retry.max_attempts;
            match self.client.get(url).send() {
                Ok(response) => {
                    let status = response.status();
                    if self.retry.should_retry_status(status) && retries_left {
                        self.wait(url, attempt, &status.to_string());
                        attempt += 1;
                        continue;
                    }
                    let final_url = response.url().to_string();
                    match response.text() {
                        Ok(body) => {
                            return Ok(FetchedPage {
                                final_url,
                                status,
                                body,
                            })
                        }
                        Err(e) if retries_left => {
                            self.wait(url, attempt, &e.to_string());
                            attempt += 1;
                        }
                        Err(e) => {
                            return Err(e).with_context(|| format!("Failed to read response: {}", url))
                        }
                    }
                }
                Err(e) if self.retry.should_retry_error(&e) && retries_left => {
                    self.wait(url, attempt, &e.to_string());
                    attempt += 1;
                }
                Err(e) => return Err(e).with_context(|| format!("Failed to fetch: {}", url)),
            }
        }
    }

    fn wait(&self, url: &str, attempt: u32, reason: &str) {
        let backoff = self.retry.backoff(attempt);
        warn!(
            "{} for {} (attempt {}/{}), backing off {:.1}s",
            reason,
            url,
            attempt,
            self.retry.max_attempts,
            backoff.as_secs_f64()
        );
        thread::sleep(backoff);
    }
}


#[cfg(test)]
mod tests {
    use super::test_server::{fast_client, redirect, response, serve, truncated};
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn test_retry_statuses() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(policy.should_retry_status(StatusCode::BAD_GATEWAY));
        assert!(!policy.should_retry_status(StatusCode::NOT_FOUND));
        assert!(!policy.should_retry_status(StatusCode::OK));
    }

    #[test]
    fn test_unavailable_then_ok_takes_two_attempts() {
        let (addr, hits) = serve(|_, hit| match hit {
            1 => response("503 Service Unavailable", "busy"),
            _ => response("200 OK", "ready"),
        });

        let page = fast_client().get(&format!("http://{}/", addr)).unwrap();
        assert_eq!(page.status, StatusCode::OK);
        assert_eq!(page.body, "ready");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_persistent_unavailable_returns_last_response() {
        let (addr, hits) = serve(|_, _| response("503 Service Unavailable", "busy"));

        let page = fast_client().get(&format!("http://{}/", addr)).unwrap();
        assert_eq!(page.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(page.body, "busy");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_not_found_is_not_retried() {
        let (addr, hits) = serve(|_, _| response("404 Not Found", "gone"));

        let page = fast_client().get(&format!("http://{}/", addr)).unwrap();
        assert_eq!(page.status, StatusCode::NOT_FOUND);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_truncated_body_is_retried() {
        let (addr, hits) = serve(|_, hit| match hit {
            1 => truncated("partial"),
            _ => response("200 OK", "complete"),
        });

        let page = fast_client().get(&format!("http://{}/", addr)).unwrap();
        assert_eq!(page.body, "complete");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_follows_redirects() {
        let (addr, _) = serve(|path, _| match path {
            "/old/" => redirect("/new/"),
            _ => response("200 OK", "moved"),
        });

        let page = fast_client().get(&format!("http://{}/old/", addr)).unwrap();
        assert_eq!(page.final_url, format!("http://{}/new/", addr));
        assert_eq!(page.body, "moved");
    }
}
