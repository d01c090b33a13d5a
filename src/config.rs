//! Run configuration read from the environment.
//!
//! [`WatchConfig::from_env`] is called once per invocation and the result is
//! passed by reference to every stage. [`WatchConfig::from_lookup`] takes any
//! key lookup so tests never touch the process environment.

use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::error::{Result, WatchError};
use crate::fetch::BrowserProfile;

pub const DEFAULT_AIRDROP_URL: &str = "https://alpha123.uk/api/data?fresh=1";
pub const DEFAULT_PUSH_URL: &str = "http://www.pushplus.plus/send";

/// Which upstream source a run scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// JSON airdrop schedule; events lie in the future.
    Airdrops,
    /// Public channel web view; events lie in the past.
    Channel,
}

impl SourceKind {
    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Airdrops => "airdrops",
            SourceKind::Channel => "channel",
        }
    }

    /// Heading used in notification bodies.
    pub fn label(self) -> &'static str {
        match self {
            SourceKind::Airdrops => "Alpha airdrops",
            SourceKind::Channel => "Channel",
        }
    }
}

impl FromStr for SourceKind {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "airdrops" | "airdrop" | "alpha" => Ok(SourceKind::Airdrops),
            "channel" | "telegram" => Ok(SourceKind::Channel),
            other => Err(WatchError::Config(format!(
                "WATCH_SOURCE must be `airdrops` or `channel`, got `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub source: SourceKind,
    /// Endpoint fetched each run.
    pub url: String,
    /// Window width W in minutes.
    pub window_minutes: u32,
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    /// Added to the wait before every further retry.
    pub backoff_base: Duration,
    /// Profiles the fetcher picks from, one per attempt.
    pub profiles: Vec<BrowserProfile>,
    /// Push credential. `None` turns delivery into a logged dry run.
    pub push_token: Option<String>,
    pub push_url: String,
    pub push_timeout: Duration,
    /// Maximum characters in a notification title before `...`.
    pub title_budget: usize,
    /// Timezone used for every timestamp shown in a notification.
    pub display_offset: FixedOffset,
    /// Timezone the airdrop API writes its `date`/`time` fields in.
    pub source_offset: FixedOffset,
}

impl Default for WatchConfig {
    fn default() -> Self {
        let beijing = FixedOffset::east_opt(8 * 3600).unwrap_or(Utc.fix());
        Self {
            source: SourceKind::Airdrops,
            url: DEFAULT_AIRDROP_URL.to_string(),
            window_minutes: 20,
            max_attempts: 5,
            attempt_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(3),
            profiles: BrowserProfile::ALL.to_vec(),
            push_token: None,
            push_url: DEFAULT_PUSH_URL.to_string(),
            push_timeout: Duration::from_secs(10),
            title_budget: 30,
            display_offset: beijing,
            source_offset: beijing,
        }
    }
}

impl WatchConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup and validate it.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let source = match get("WATCH_SOURCE") {
            Some(raw) => raw.parse::<SourceKind>()?,
            None => defaults.source,
        };

        let url = match (get("WATCH_URL"), source) {
            (Some(url), _) => url,
            (None, SourceKind::Airdrops) => defaults.url,
            (None, SourceKind::Channel) => {
                let channel = get("TELEGRAM_CHANNEL").ok_or_else(|| {
                    WatchError::Config(
                        "TELEGRAM_CHANNEL or WATCH_URL is required for the channel source".into(),
                    )
                })?;
                format!("https://t.me/s/{}", channel.trim().trim_start_matches('@'))
            }
        };

        let profiles = match get("BROWSER_PROFILES") {
            Some(raw) => raw
                .split(',')
                .map(|name| name.parse::<BrowserProfile>())
                .collect::<Result<Vec<_>>>()?,
            None => defaults.profiles,
        };

        let config = Self {
            source,
            url,
            window_minutes: parse_or(&get, "WINDOW_MINUTES", defaults.window_minutes)?,
            max_attempts: parse_or(&get, "MAX_ATTEMPTS", defaults.max_attempts)?,
            attempt_timeout: Duration::from_secs(parse_or(
                &get,
                "ATTEMPT_TIMEOUT_SECS",
                defaults.attempt_timeout.as_secs(),
            )?),
            backoff_base: Duration::from_secs(parse_or(
                &get,
                "BACKOFF_BASE_SECS",
                defaults.backoff_base.as_secs(),
            )?),
            profiles,
            push_token: get("PUSHPLUS_TOKEN").map(|t| t.trim().to_string()),
            push_url: get("PUSHPLUS_URL").unwrap_or(defaults.push_url),
            push_timeout: Duration::from_secs(parse_or(
                &get,
                "PUSH_TIMEOUT_SECS",
                defaults.push_timeout.as_secs(),
            )?),
            title_budget: parse_or(&get, "TITLE_BUDGET", defaults.title_budget)?,
            display_offset: offset_or(&get, "DISPLAY_UTC_OFFSET_HOURS", defaults.display_offset)?,
            source_offset: offset_or(&get, "SOURCE_UTC_OFFSET_HOURS", defaults.source_offset)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks:
    /// - `window_minutes`, `max_attempts`, `title_budget` are greater than 0
    /// - both timeouts are greater than 0
    /// - at least one browser profile is enabled
    pub fn validate(&self) -> Result<()> {
        if self.window_minutes == 0 {
            return Err(WatchError::Config(
                "WINDOW_MINUTES must be greater than 0".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(WatchError::Config(
                "MAX_ATTEMPTS must be greater than 0".into(),
            ));
        }
        if self.attempt_timeout.is_zero() || self.push_timeout.is_zero() {
            return Err(WatchError::Config("timeouts must be greater than 0".into()));
        }
        if self.title_budget == 0 {
            return Err(WatchError::Config(
                "TITLE_BUDGET must be greater than 0".into(),
            ));
        }
        if self.profiles.is_empty() {
            return Err(WatchError::Config(
                "at least one browser profile must be enabled".into(),
            ));
        }
        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| WatchError::Config(format!("{key}=`{raw}` is invalid: {e}"))),
        None => Ok(default),
    }
}

fn offset_or<G>(get: &G, key: &str, default: FixedOffset) -> Result<FixedOffset>
where
    G: Fn(&str) -> Option<String>,
{
    let hours: i32 = match get(key) {
        Some(_) => parse_or(get, key, 0)?,
        None => return Ok(default),
    };
    hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| WatchError::Config(format!("{key}={hours} is not a valid UTC offset")))
}
