//! Public channel web view (`https://t.me/s/<channel>`).
//!
//! Each message is rendered as a `.tgme_widget_message` element carrying a
//! `data-post` id, a `time[datetime]` publish stamp and, when the message has
//! text, a `.tgme_widget_message_text` container with the rich markup.

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Node, Selector};

use super::{Extraction, Extractor};
use crate::error::{Result, WatchError};
use crate::event::{Event, EventBody};
use crate::window::Horizon;

struct Selectors {
    message: Selector,
    text: Selector,
    time: Selector,
    date_link: Selector,
    owner: Selector,
}

impl Selectors {
    fn new() -> Result<Self> {
        let parse = |css: &str| {
            Selector::parse(css)
                .map_err(|e| WatchError::Parse(format!("invalid selector `{css}`: {e:?}")))
        };
        Ok(Self {
            message: parse(".tgme_widget_message")?,
            text: parse(".tgme_widget_message_text")?,
            time: parse("time[datetime]")?,
            date_link: parse("a.tgme_widget_message_date")?,
            owner: parse(".tgme_widget_message_owner_name")?,
        })
    }
}

/// Extracts channel messages newest first.
///
/// Precondition: the page lists messages in chronological order with no
/// gaps, so reversing document order gives newest first. The window scan
/// relies on this to stop at the first expired message. If the page ever
/// renders out of order, messages after that point are silently missed.
#[derive(Debug, Default)]
pub struct ChannelExtractor;

impl ChannelExtractor {
    pub fn new() -> Self {
        Self
    }

    fn event(&self, message: ElementRef<'_>, sel: &Selectors) -> Option<Event> {
        let post = message.value().attr("data-post").unwrap_or_default().to_string();

        let stamp = message
            .select(&sel.time)
            .next()
            .and_then(|t| t.value().attr("datetime"))?;
        let published = match DateTime::parse_from_rfc3339(stamp) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(e) => {
                tracing::warn!(%post, stamp, error = %e, "unparseable publish time, skipped");
                return None;
            }
        };

        let (html, text) = match message.select(&sel.text).next() {
            Some(container) => (container.inner_html(), plain_text(container)),
            None => (String::new(), String::new()),
        };

        let link = message
            .select(&sel.date_link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string)
            .or_else(|| (!post.is_empty()).then(|| format!("https://t.me/{post}")));

        let display_name = message
            .select(&sel.owner)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|name| !name.is_empty());

        Some(Event {
            identifier: post,
            display_name,
            scheduled_at: published,
            completed: false,
            body: EventBody::Message { html, text },
            link,
        })
    }
}

impl Extractor for ChannelExtractor {
    fn horizon(&self) -> Horizon {
        Horizon::Recent
    }

    fn extract(&self, raw: &str) -> Result<Extraction> {
        let sel = Selectors::new()?;
        let document = Html::parse_document(raw);

        let mut events = Vec::new();
        let mut dropped = 0;
        for message in document.select(&sel.message) {
            match self.event(message, &sel) {
                Some(event) => events.push(event),
                None => dropped += 1,
            }
        }
        events.reverse();

        if events.is_empty() {
            tracing::warn!("no messages found on channel page");
        } else {
            tracing::info!(messages = events.len(), dropped, "channel page parsed");
        }

        Ok(Extraction {
            reference_time: None,
            events,
            dropped,
        })
    }
}

/// Text content with `<br>` read as a space, whitespace collapsed and trimmed.
fn plain_text(container: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in container.descendants() {
        match node.value() {
            Node::Text(text) => raw.push_str(text),
            Node::Element(el) if el.name() == "br" => raw.push(' '),
            _ => {}
        }
    }
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><body><section class="tgme_channel_history">
<div class="tgme_widget_message_wrap">
  <div class="tgme_widget_message" data-post="alpha_news/100">
    <div class="tgme_widget_message_owner_name"><span>Alpha News</span></div>
    <div class="tgme_widget_message_text js-message_text" dir="auto">Old <b>listing</b></div>
    <div class="tgme_widget_message_footer">
      <a class="tgme_widget_message_date" href="https://t.me/alpha_news/100"><time datetime="2024-05-01T11:00:00+00:00" class="time">11:00</time></a>
    </div>
  </div>
</div>
<div class="tgme_widget_message_wrap">
  <div class="tgme_widget_message" data-post="alpha_news/101">
    <div class="tgme_widget_message_photo_wrap"></div>
    <div class="tgme_widget_message_footer">
      <a class="tgme_widget_message_date" href="https://t.me/alpha_news/101"><time datetime="2024-05-01T19:50:00+08:00" class="time">19:50</time></a>
    </div>
  </div>
</div>
<div class="tgme_widget_message_wrap">
  <div class="tgme_widget_message" data-post="alpha_news/102">
    <div class="tgme_widget_message_text js-message_text" dir="auto">New token <a href="https://example.com/x">XYZ</a> live<br/>Deposit   opens
  now</div>
    <div class="tgme_widget_message_footer">
      <time datetime="2024-05-01T11:58:00+00:00" class="time">11:58</time>
    </div>
  </div>
</div>
<div class="tgme_widget_message_wrap">
  <div class="tgme_widget_message" data-post="alpha_news/103">
    <div class="tgme_widget_message_text">no timestamp at all</div>
  </div>
</div>
</section></body></html>"#;

    fn extract() -> Extraction {
        ChannelExtractor::new().extract(PAGE).unwrap()
    }

    #[test]
    fn messages_come_out_newest_first() {
        let ids: Vec<_> = extract()
            .events
            .iter()
            .map(|e| e.identifier.clone())
            .collect();
        assert_eq!(ids, vec!["alpha_news/102", "alpha_news/101", "alpha_news/100"]);
    }

    #[test]
    fn message_without_timestamp_is_dropped() {
        let out = extract();
        assert_eq!(out.dropped, 1);
        assert!(out.reference_time.is_none());
    }

    #[test]
    fn publish_time_is_normalised_to_utc() {
        let out = extract();
        let photo = &out.events[1];
        assert_eq!(
            photo.scheduled_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 11, 50, 0).unwrap()
        );
    }

    #[test]
    fn rich_markup_is_kept_and_text_is_flattened() {
        let out = extract();
        match &out.events[0].body {
            EventBody::Message { html, text } => {
                assert!(html.contains(r#"<a href="https://example.com/x">XYZ</a>"#));
                assert!(html.contains("<br>"));
                assert_eq!(text, "New token XYZ live Deposit opens now");
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn image_only_message_has_no_payload() {
        let out = extract();
        let photo = &out.events[1];
        assert!(!photo.has_payload());
        assert!(out.events[0].has_payload());
    }

    #[test]
    fn link_prefers_date_anchor_then_post_id() {
        let out = extract();
        assert_eq!(
            out.events[0].link.as_deref(),
            Some("https://t.me/alpha_news/102")
        );
        assert_eq!(
            out.events[2].link.as_deref(),
            Some("https://t.me/alpha_news/100")
        );
        assert_eq!(out.events[2].display_name.as_deref(), Some("Alpha News"));
    }

    #[test]
    fn page_without_messages_is_empty_not_an_error() {
        let out = ChannelExtractor::new()
            .extract("<html><body>Channel not found</body></html>")
            .unwrap();
        assert!(out.events.is_empty());
    }

    #[test]
    fn horizon_is_recent() {
        assert_eq!(ChannelExtractor::new().horizon(), Horizon::Recent);
    }
}
