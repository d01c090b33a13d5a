//! Time-window classification of candidates against the reference clock.
//!
//! Offsets are signed fractional minutes. For [`Horizon::Upcoming`] the
//! offset is `scheduled_at - now`; for [`Horizon::Recent`] it is
//! `now - published_at`. Only the recent horizon may stop a scan early, and
//! only because its source lists candidates newest first.

use chrono::{DateTime, Utc};

use crate::event::Event;

/// Which side of "now" a source's events lie on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    /// Scheduled starts in the future. Input order is arbitrary.
    Upcoming,
    /// Publish times in the past, newest first.
    Recent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    DueSoon,
    /// Upcoming only: further out than the window.
    NotYet,
    /// Recent only: older than the window. Everything after it is too.
    Expired,
    /// Already started (upcoming) or published in the future (recent).
    Anomaly,
}

pub fn offset_minutes(horizon: Horizon, at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let delta = match horizon {
        Horizon::Upcoming => at - now,
        Horizon::Recent => now - at,
    };
    delta.num_milliseconds() as f64 / 60_000.0
}

pub fn classify(horizon: Horizon, minutes: f64, window: f64) -> Verdict {
    match horizon {
        Horizon::Upcoming if minutes <= 0.0 => Verdict::Anomaly,
        Horizon::Upcoming if minutes <= window => Verdict::DueSoon,
        Horizon::Upcoming => Verdict::NotYet,
        Horizon::Recent if minutes < 0.0 => Verdict::Anomaly,
        Horizon::Recent if minutes <= window => Verdict::DueSoon,
        Horizon::Recent => Verdict::Expired,
    }
}

/// A candidate that fell inside the window.
#[derive(Debug, Clone)]
pub struct Due {
    pub event: Event,
    pub minutes: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSummary {
    /// Candidates pulled from the input.
    pub visited: usize,
    /// Candidates yielded for notification.
    pub due: usize,
    /// In the window but with nothing to push.
    pub silent: usize,
    /// Not yet due, already started, or skewed.
    pub skipped: usize,
    pub stopped_early: bool,
}

/// Lazy scan yielding due candidates.
///
/// Candidates are pulled from the input one at a time, so nothing past an
/// early stop is ever read.
pub struct WindowScan<I> {
    candidates: I,
    horizon: Horizon,
    now: DateTime<Utc>,
    window: f64,
    summary: ScanSummary,
    done: bool,
}

impl<I: Iterator<Item = Event>> WindowScan<I> {
    pub fn new<C>(candidates: C, horizon: Horizon, now: DateTime<Utc>, window_minutes: u32) -> Self
    where
        C: IntoIterator<IntoIter = I>,
    {
        Self {
            candidates: candidates.into_iter(),
            horizon,
            now,
            window: f64::from(window_minutes),
            summary: ScanSummary::default(),
            done: false,
        }
    }

    pub fn summary(&self) -> &ScanSummary {
        &self.summary
    }
}

impl<I: Iterator<Item = Event>> Iterator for WindowScan<I> {
    type Item = Due;

    fn next(&mut self) -> Option<Due> {
        if self.done {
            return None;
        }
        for event in self.candidates.by_ref() {
            self.summary.visited += 1;
            let minutes = offset_minutes(self.horizon, event.scheduled_at, self.now);

            match classify(self.horizon, minutes, self.window) {
                Verdict::DueSoon if event.has_payload() => {
                    self.summary.due += 1;
                    tracing::info!(id = %event.identifier, minutes, "due");
                    return Some(Due { event, minutes });
                }
                Verdict::DueSoon => {
                    self.summary.silent += 1;
                    tracing::debug!(id = %event.identifier, "in window but no text, skipped");
                }
                Verdict::NotYet => {
                    self.summary.skipped += 1;
                    tracing::debug!(id = %event.identifier, minutes, "not yet due");
                }
                Verdict::Anomaly => {
                    self.summary.skipped += 1;
                    match self.horizon {
                        Horizon::Upcoming => {
                            tracing::debug!(id = %event.identifier, minutes, "already started")
                        }
                        Horizon::Recent => tracing::warn!(
                            id = %event.identifier,
                            minutes,
                            "published in the future, clock skew"
                        ),
                    }
                }
                Verdict::Expired => {
                    tracing::debug!(
                        id = %event.identifier,
                        minutes,
                        "outside window, stopping scan"
                    );
                    self.summary.stopped_early = true;
                    self.done = true;
                    return None;
                }
            }
        }
        self.done = true;
        None
    }
}
