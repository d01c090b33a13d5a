use chrono::{DateTime, Utc};

/// One candidate pulled out of a fetched page. Lives for a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Token symbol or message post id.
    pub identifier: String,
    pub display_name: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub completed: bool,
    pub body: EventBody,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    Airdrop {
        chain_id: String,
        contract_address: String,
        /// The `time` field exactly as the API wrote it.
        time_label: String,
    },
    Message {
        /// Inner markup of the message text, unmodified.
        html: String,
        /// Plain rendering used for titles.
        text: String,
    },
}

impl Event {
    /// Whether there is anything worth pushing. Image-only messages have no text.
    pub fn has_payload(&self) -> bool {
        match &self.body {
            EventBody::Airdrop { .. } => true,
            EventBody::Message { text, .. } => !text.is_empty(),
        }
    }
}
