//! Turning a fetched body into candidate events.
//!
//! Each source has one [`Extractor`]. Both return the same [`Event`] shape so
//! the window filter and notifier never need to know which source ran.

pub mod airdrop;
pub mod channel;

pub use airdrop::AirdropExtractor;
pub use channel::ChannelExtractor;

use chrono::{DateTime, Utc};

use crate::config::{SourceKind, WatchConfig};
use crate::error::Result;
use crate::event::Event;
use crate::window::Horizon;

#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Server-supplied "now", preferred over the local clock when present.
    pub reference_time: Option<DateTime<Utc>>,
    /// Candidates in the order the window filter should visit them.
    pub events: Vec<Event>,
    /// Items discarded before filtering (completed, malformed, unparseable).
    pub dropped: usize,
}

pub trait Extractor: Send + Sync {
    fn horizon(&self) -> Horizon;

    /// # Errors
    ///
    /// Fails only when the body as a whole has the wrong shape. A bad item
    /// is dropped and counted in [`Extraction::dropped`].
    fn extract(&self, raw: &str) -> Result<Extraction>;
}

/// Pick the extractor for the configured source.
pub fn for_source(config: &WatchConfig) -> Box<dyn Extractor> {
    match config.source {
        SourceKind::Airdrops => Box::new(AirdropExtractor::new(config.source_offset)),
        SourceKind::Channel => Box::new(ChannelExtractor::new()),
    }
}
