//! One scan: fetch, extract, filter, notify.
//!
//! [`Watcher::run`] never fails. Fetch exhaustion and a malformed page end
//! the scan with zero notifications; a failed push is counted and the scan
//! moves on to the next candidate.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{SourceKind, WatchConfig};
use crate::error::Result;
use crate::extract::{self, Extractor};
use crate::fetch::{Fetcher, HttpTransport, RetryPolicy, Sleeper, TokioSleeper, Transport};
use crate::notify::{Delivery, Formatter, Notifier};
use crate::window::WindowScan;

/// Source of the local wall clock, used when the page carries no server time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub source: &'static str,
    pub fetched: bool,
    pub reference_time: Option<DateTime<Utc>>,
    pub candidates: usize,
    pub dropped: usize,
    pub visited: usize,
    pub due: usize,
    pub silent: usize,
    pub stopped_early: bool,
    pub sent: usize,
    pub dry_run: usize,
    pub failed: usize,
}

pub struct Watcher<T, S> {
    source: SourceKind,
    url: String,
    window_minutes: u32,
    fetcher: Fetcher<T, S>,
    extractor: Box<dyn Extractor>,
    formatter: Formatter,
    notifier: Notifier,
    clock: Box<dyn Clock>,
}

impl Watcher<HttpTransport, TokioSleeper> {
    /// Production wiring: reqwest transport, tokio sleep, PushPlus, system clock.
    pub fn from_config(config: &WatchConfig) -> Result<Self> {
        let fetcher = Fetcher::new(
            HttpTransport::new()?,
            TokioSleeper,
            RetryPolicy::from_config(config),
            config.profiles.clone(),
        );
        Ok(Self::new(
            config,
            fetcher,
            Notifier::from_config(config)?,
            Box::new(SystemClock),
        ))
    }
}

impl<T: Transport, S: Sleeper> Watcher<T, S> {
    pub fn new(
        config: &WatchConfig,
        fetcher: Fetcher<T, S>,
        notifier: Notifier,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            source: config.source,
            url: config.url.clone(),
            window_minutes: config.window_minutes,
            fetcher,
            extractor: extract::for_source(config),
            formatter: Formatter::from_config(config),
            notifier,
            clock,
        }
    }

    pub async fn run(&self) -> RunReport {
        let started = self.clock.now();
        let mut report = RunReport {
            source: self.source.name(),
            ..RunReport::default()
        };
        tracing::info!(url = %self.url, window = self.window_minutes, "scan started");

        let response = match self.fetcher.fetch(&self.url).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "fetch failed, giving up this scan");
                return report;
            }
        };
        report.fetched = true;

        let extraction = match self.extractor.extract(&response.body) {
            Ok(extraction) => extraction,
            Err(e) => {
                tracing::error!(error = %e, "could not read fetched page");
                return report;
            }
        };
        report.reference_time = extraction.reference_time;
        report.candidates = extraction.events.len();
        report.dropped = extraction.dropped;

        // Fetch retries may have taken minutes; read the local clock again.
        let now = extraction.reference_time.unwrap_or_else(|| self.clock.now());
        tracing::info!(
            reference = %now,
            server_time = extraction.reference_time.is_some(),
            candidates = report.candidates,
            "filtering candidates"
        );

        let mut scan = WindowScan::new(
            extraction.events,
            self.extractor.horizon(),
            now,
            self.window_minutes,
        );
        for due in scan.by_ref() {
            let notification = self.formatter.render(&due, started);
            match self.notifier.notify(&notification).await {
                Delivery::Sent => report.sent += 1,
                Delivery::DryRun => report.dry_run += 1,
                Delivery::Failed => report.failed += 1,
            }
        }

        let summary = scan.summary();
        report.visited = summary.visited;
        report.due = summary.due;
        report.silent = summary.silent;
        report.stopped_early = summary.stopped_early;

        tracing::info!(
            visited = report.visited,
            due = report.due,
            sent = report.sent,
            failed = report.failed,
            "scan finished"
        );
        report
    }
}
