//! Polls an airdrop schedule API or a public channel page and pushes the
//! events that fall inside a configured time window.
//!
//! Each run is stateless: fetch with bounded retry, extract candidates,
//! classify them against the reference clock, push the due ones.

pub mod config;
pub mod error;
pub mod event;
pub mod extract;
pub mod fetch;
pub mod notify;
pub mod pipeline;
pub mod window;

pub use config::{SourceKind, WatchConfig};
pub use error::{Result, WatchError};
pub use event::{Event, EventBody};
pub use pipeline::{RunReport, Watcher};
