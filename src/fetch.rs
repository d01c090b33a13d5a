//! Bounded retry fetch for endpoints sitting behind bot protection.
//!
//! The [`Fetcher`] owns the retry policy only. Sending the request is the
//! job of a [`Transport`], which receives the [`BrowserProfile`] chosen for
//! each attempt, and waiting between attempts goes through a [`Sleeper`] so
//! tests can observe the backoff schedule without real time passing.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};

/// Browser identity presented to the endpoint on one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserProfile {
    Chrome110,
    Chrome120,
    Safari15_5,
}

impl BrowserProfile {
    pub const ALL: [BrowserProfile; 3] = [
        BrowserProfile::Chrome110,
        BrowserProfile::Chrome120,
        BrowserProfile::Safari15_5,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BrowserProfile::Chrome110 => "chrome110",
            BrowserProfile::Chrome120 => "chrome120",
            BrowserProfile::Safari15_5 => "safari15_5",
        }
    }

    pub fn user_agent(self) -> &'static str {
        match self {
            BrowserProfile::Chrome110 => "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36",
            BrowserProfile::Chrome120 => "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            BrowserProfile::Safari15_5 => "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/15.5 Safari/605.1.15",
        }
    }

    fn accept(self) -> &'static str {
        match self {
            BrowserProfile::Chrome110 | BrowserProfile::Chrome120 => "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            BrowserProfile::Safari15_5 => "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        }
    }
}

impl fmt::Display for BrowserProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BrowserProfile {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        BrowserProfile::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| WatchError::Config(format!("unknown browser profile `{wanted}`")))
    }
}

/// Transport-level outcome of one attempt. No parsing happens here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

/// Sends a single GET. Non-200 statuses are returned, not raised.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        profile: BrowserProfile,
        timeout: Duration,
    ) -> Result<FetchResponse>;
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// [`Transport`] backed by a shared [`reqwest::Client`].
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| WatchError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        profile: BrowserProfile,
        timeout: Duration,
    ) -> Result<FetchResponse> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .header(USER_AGENT, profile.user_agent())
            .header(ACCEPT, profile.accept())
            .header(ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9,en;q=0.8")
            .send()
            .await
            .map_err(|e| WatchError::from_reqwest("request failed", e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| WatchError::from_reqwest("response read failed", e))?;

        Ok(FetchResponse { status, body })
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff_base: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            attempt_timeout: config.attempt_timeout,
            backoff_base: config.backoff_base,
        }
    }

    /// Linear backoff: the wait after attempt `n` is `n * base`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff_base * attempt
    }
}

pub struct Fetcher<T, S> {
    transport: T,
    sleeper: S,
    policy: RetryPolicy,
    profiles: Vec<BrowserProfile>,
}

impl<T: Transport, S: Sleeper> Fetcher<T, S> {
    pub fn new(
        transport: T,
        sleeper: S,
        policy: RetryPolicy,
        profiles: Vec<BrowserProfile>,
    ) -> Self {
        Self {
            transport,
            sleeper,
            policy,
            profiles,
        }
    }

    fn pick_profile(&self) -> BrowserProfile {
        let mut rng = rand::thread_rng();
        self.profiles
            .choose(&mut rng)
            .copied()
            .unwrap_or(BrowserProfile::Chrome120)
    }

    /// Fetch `url`, stopping at the first 200.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Exhausted`] once every attempt has failed.
    pub async fn fetch(&self, url: &str) -> Result<FetchResponse> {
        let max = self.policy.max_attempts;

        for attempt in 1..=max {
            let profile = self.pick_profile();
            tracing::info!(attempt, max, %profile, url, "fetching");

            match self
                .transport
                .get(url, profile, self.policy.attempt_timeout)
                .await
            {
                Ok(response) if response.status == 200 => {
                    tracing::info!(attempt, bytes = response.body.len(), "fetch succeeded");
                    return Ok(response);
                }
                Ok(response) if response.status == 403 => {
                    tracing::warn!(attempt, "403 Forbidden, rejected by bot protection");
                }
                Ok(response) => {
                    tracing::warn!(attempt, status = response.status, "unexpected status");
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "request failed");
                }
            }

            if attempt < max {
                let wait = self.policy.backoff_after(attempt);
                tracing::info!(wait_secs = wait.as_secs_f64(), "waiting before retry");
                self.sleeper.sleep(wait).await;
            }
        }

        Err(WatchError::Exhausted { attempts: max })
    }
}
