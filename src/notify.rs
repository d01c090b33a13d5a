//! Notification formatting and delivery through PushPlus.
//!
//! Delivery never fails the scan: a missing token turns every push into a
//! logged dry run, and transport errors are logged and reported back as
//! [`Delivery::Failed`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{SourceKind, WatchConfig};
use crate::error::{Result, WatchError};
use crate::event::EventBody;
use crate::window::Due;

const ELLIPSIS: &str = "...";
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    /// HTML fragment.
    pub content: String,
}

/// Keep at most `budget` characters, appending `...` only when cut.
pub fn truncate_title(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let mut title: String = text.chars().take(budget).collect();
    title.push_str(ELLIPSIS);
    title
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Builds notifications for due events, sharing display settings.
pub struct Formatter {
    source: SourceKind,
    window_minutes: u32,
    title_budget: usize,
    display_offset: FixedOffset,
}

impl Formatter {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            source: config.source,
            window_minutes: config.window_minutes,
            title_budget: config.title_budget,
            display_offset: config.display_offset,
        }
    }

    fn local(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.display_offset)
            .format(DISPLAY_FORMAT)
            .to_string()
    }

    pub fn render(&self, due: &Due, scanned_at: DateTime<Utc>) -> Notification {
        let event = &due.event;
        let footer = format!(
            "<hr><small>Scanned at {} (UTC{})</small>",
            self.local(scanned_at),
            self.display_offset
        );

        match &event.body {
            EventBody::Airdrop {
                chain_id,
                contract_address,
                time_label,
            } => {
                let minutes_left = due.minutes.floor() as i64;
                let project = match &event.display_name {
                    Some(name) => format!(
                        "{} ({})",
                        html_escape(&event.identifier),
                        html_escape(name)
                    ),
                    None => html_escape(&event.identifier),
                };
                let content = format!(
                    "<b>{label}: starting within {window} minutes</b><br><br>\
                     Project: {project}<br>\
                     Starts at: {start} (listed as {time_label})<br>\
                     Time left: {minutes_left} min<br>\
                     Chain ID: {chain}<br>\
                     Contract: {contract}<br>\
                     {footer}",
                    label = self.source.label(),
                    window = self.window_minutes,
                    start = self.local(event.scheduled_at),
                    time_label = html_escape(time_label),
                    chain = html_escape(chain_id),
                    contract = html_escape(contract_address),
                );
                let title = truncate_title(
                    &format!("{} starts in {minutes_left} min", event.identifier),
                    self.title_budget,
                );
                Notification { title, content }
            }
            EventBody::Message { html, text } => {
                let source = event.display_name.as_deref().unwrap_or(self.source.label());
                let link = event
                    .link
                    .as_deref()
                    .map(|url| format!("<br><a href=\"{}\">View original</a>", html_escape(url)))
                    .unwrap_or_default();
                let content = format!(
                    "<b>{source}</b> · {published}<br><br>\
                     <div>{html}</div>\
                     {link}\
                     {footer}",
                    source = html_escape(source),
                    published = self.local(event.scheduled_at),
                );
                Notification {
                    title: truncate_title(text, self.title_budget),
                    content,
                }
            }
        }
    }
}

/// Outcome of one push, as reported to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    DryRun,
    Failed,
}

#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<()>;
}

#[derive(Serialize)]
struct PushRequest<'a> {
    token: &'a str,
    title: &'a str,
    content: &'a str,
    template: &'a str,
}

#[derive(Deserialize)]
struct PushReply {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
}

pub struct PushPlus {
    client: reqwest::Client,
    url: String,
    token: String,
    timeout: Duration,
}

impl PushPlus {
    pub fn new(
        url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| WatchError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            token: token.into(),
            timeout,
        })
    }
}

#[async_trait]
impl PushTransport for PushPlus {
    async fn deliver(&self, notification: &Notification) -> Result<()> {
        let request = PushRequest {
            token: &self.token,
            title: &notification.title,
            content: &notification.content,
            template: "html",
        };

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| WatchError::from_reqwest("push request failed", e))?
            .error_for_status()
            .map_err(|e| WatchError::Push(format!("push HTTP error: {e}")))?;

        let reply: PushReply = response
            .json()
            .await
            .map_err(|e| WatchError::Push(format!("unreadable push reply: {e}")))?;
        if reply.code != 200 {
            return Err(WatchError::Push(format!(
                "push rejected with code {}: {}",
                reply.code,
                reply.msg.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

/// Delivers notifications, or logs them when no credential is configured.
pub struct Notifier {
    transport: Option<Box<dyn PushTransport>>,
}

impl Notifier {
    pub fn new(transport: Option<Box<dyn PushTransport>>) -> Self {
        Self { transport }
    }

    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        let transport = match &config.push_token {
            Some(token) => Some(Box::new(PushPlus::new(
                config.push_url.clone(),
                token.clone(),
                config.push_timeout,
            )?) as Box<dyn PushTransport>),
            None => None,
        };
        Ok(Self::new(transport))
    }

    pub async fn notify(&self, notification: &Notification) -> Delivery {
        let Some(transport) = &self.transport else {
            tracing::warn!(title = %notification.title, "no push token configured, dry run");
            return Delivery::DryRun;
        };
        match transport.deliver(notification).await {
            Ok(()) => {
                tracing::info!(title = %notification.title, "push sent");
                Delivery::Sent
            }
            Err(e) => {
                tracing::error!(title = %notification.title, error = %e, "push failed");
                Delivery::Failed
            }
        }
    }
}
