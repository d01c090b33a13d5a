//! JSON airdrop schedule.
//!
//! Expected body: `{ "system_timestamp": 1714550000, "airdrops": [ ... ] }`,
//! each item carrying `name`, `token`, `date` (`YYYY-MM-DD`), `time`
//! (`HH:MM`), `completed` and optionally `chain_id` / `contract_address`.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{Extraction, Extractor};
use crate::error::{Result, WatchError};
use crate::event::{Event, EventBody};
use crate::window::Horizon;

const SCHEDULE_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(default)]
    system_timestamp: Option<f64>,
    #[serde(default)]
    airdrops: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default, deserialize_with = "truthy")]
    completed: bool,
    #[serde(default)]
    chain_id: Option<Value>,
    #[serde(default)]
    contract_address: Option<Value>,
}

pub struct AirdropExtractor {
    /// Timezone the API's `date`/`time` strings are written in.
    source_offset: FixedOffset,
}

impl AirdropExtractor {
    pub fn new(source_offset: FixedOffset) -> Self {
        Self { source_offset }
    }

    fn schedule(&self, date: &str, time: &str) -> Option<DateTime<Utc>> {
        let stamp = format!("{} {}", date.trim(), time.trim());
        let naive = NaiveDateTime::parse_from_str(&stamp, SCHEDULE_FORMAT).ok()?;
        self.source_offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    fn event(&self, raw: Value) -> Option<Event> {
        let item: Item = match serde_json::from_value(raw) {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(error = %e, "malformed airdrop item, skipped");
                return None;
            }
        };

        let label = item
            .token
            .clone()
            .or_else(|| item.name.clone())
            .unwrap_or_else(|| "?".to_string());

        if item.completed {
            tracing::debug!(token = %label, "completed, skipped");
            return None;
        }
        let (Some(date), Some(time)) = (non_empty(item.date), non_empty(item.time)) else {
            tracing::debug!(token = %label, "no date/time, skipped");
            return None;
        };
        let Some(scheduled_at) = self.schedule(&date, &time) else {
            tracing::warn!(token = %label, %date, %time, "unparseable schedule, skipped");
            return None;
        };

        Some(Event {
            identifier: label,
            display_name: item.name,
            scheduled_at,
            completed: false,
            body: EventBody::Airdrop {
                chain_id: text_or(item.chain_id, "unknown"),
                contract_address: text_or(item.contract_address, "none"),
                time_label: time,
            },
            link: None,
        })
    }
}

impl Extractor for AirdropExtractor {
    fn horizon(&self) -> Horizon {
        Horizon::Upcoming
    }

    fn extract(&self, raw: &str) -> Result<Extraction> {
        let feed: Feed = serde_json::from_str(raw)
            .map_err(|e| WatchError::Parse(format!("airdrop feed is not the expected JSON: {e}")))?;

        let reference_time = feed
            .system_timestamp
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| DateTime::from_timestamp_millis((secs * 1000.0) as i64));

        let total = feed.airdrops.len();
        let events: Vec<Event> = feed
            .airdrops
            .into_iter()
            .filter_map(|item| self.event(item))
            .collect();

        tracing::info!(total, candidates = events.len(), "airdrop feed parsed");
        Ok(Extraction {
            reference_time,
            dropped: total - events.len(),
            events,
        })
    }
}

/// `completed` is not always a bool upstream: `1`, `"true"` and `"yes"` mean
/// done, `0`, `""`, `"false"`, `"0"` and null do not.
fn truthy<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn text_or(value: Option<Value>, default: &str) -> String {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc8() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn extract(body: Value) -> Extraction {
        AirdropExtractor::new(utc8())
            .extract(&body.to_string())
            .unwrap()
    }

    #[test]
    fn parses_schedule_in_source_timezone() {
        let out = extract(json!({
            "system_timestamp": 1714550400,
            "airdrops": [{
                "name": "Alpha One", "token": "AONE",
                "date": "2024-05-01", "time": "16:10",
                "completed": false, "chain_id": 56, "contract_address": "0xabc"
            }]
        }));

        assert_eq!(
            out.reference_time,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap())
        );
        assert_eq!(out.events.len(), 1);
        let event = &out.events[0];
        assert_eq!(event.identifier, "AONE");
        assert_eq!(event.display_name.as_deref(), Some("Alpha One"));
        assert_eq!(
            event.scheduled_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 10, 0).unwrap()
        );
        assert_eq!(
            event.body,
            EventBody::Airdrop {
                chain_id: "56".into(),
                contract_address: "0xabc".into(),
                time_label: "16:10".into(),
            }
        );
    }

    #[test]
    fn completed_items_never_become_candidates() {
        let out = extract(json!({
            "airdrops": [
                {"token": "DONE", "date": "2024-05-01", "time": "16:05", "completed": true},
                {"token": "LIVE", "date": "2024-05-01", "time": "16:05", "completed": false}
            ]
        }));
        let ids: Vec<_> = out.events.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, vec!["LIVE"]);
        assert_eq!(out.dropped, 1);
    }

    #[test]
    fn missing_or_bad_schedule_is_dropped_without_failing() {
        let out = extract(json!({
            "airdrops": [
                {"token": "NODATE", "time": "10:00"},
                {"token": "EMPTY", "date": "", "time": "10:00"},
                {"token": "BAD", "date": "2024/05/01", "time": "10:00"},
                {"token": "BADTIME", "date": "2024-05-01", "time": "25:99"},
                {"token": "OK", "date": "2024-05-01", "time": "10:00"}
            ]
        }));
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].identifier, "OK");
        assert_eq!(out.dropped, 4);
    }

    #[test]
    fn malformed_item_does_not_affect_siblings() {
        let out = extract(json!({
            "airdrops": [
                "not an object",
                {"token": 42, "date": "2024-05-01", "time": "10:00"},
                {"token": "OK", "date": "2024-05-01", "time": "10:00"}
            ]
        }));
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.dropped, 2);
    }

    #[test]
    fn passthrough_fields_have_defaults() {
        let out = extract(json!({
            "airdrops": [
                {"name": "Only Name", "date": "2024-05-01", "time": "10:00", "chain_id": ""}
            ]
        }));
        let event = &out.events[0];
        assert_eq!(event.identifier, "Only Name");
        match &event.body {
            EventBody::Airdrop {
                chain_id,
                contract_address,
                ..
            } => {
                assert_eq!(chain_id, "unknown");
                assert_eq!(contract_address, "none");
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn loosely_typed_completed_flag_is_honoured() {
        let out = extract(json!({
            "airdrops": [
                {"token": "ONE", "date": "2024-05-01", "time": "10:00", "completed": 1},
                {"token": "STR", "date": "2024-05-01", "time": "10:00", "completed": "true"},
                {"token": "ZERO", "date": "2024-05-01", "time": "10:00", "completed": 0},
                {"token": "NO", "date": "2024-05-01", "time": "10:00", "completed": "false"},
                {"token": "NULL", "date": "2024-05-01", "time": "10:00", "completed": null}
            ]
        }));
        let ids: Vec<_> = out.events.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, vec!["ZERO", "NO", "NULL"]);
        assert_eq!(out.dropped, 2);
    }

    #[test]
    fn non_positive_system_timestamp_is_ignored() {
        for ts in [json!(0), json!(-5), json!(0.0)] {
            let out = extract(json!({ "system_timestamp": ts, "airdrops": [] }));
            assert!(out.reference_time.is_none(), "timestamp {ts} was used");
        }
    }

    #[test]
    fn missing_system_timestamp_leaves_reference_unset() {
        let out = extract(json!({ "airdrops": [] }));
        assert!(out.reference_time.is_none());
        assert!(out.events.is_empty());
    }

    #[test]
    fn non_json_body_is_a_parse_error() {
        let err = AirdropExtractor::new(utc8())
            .extract("<html>Just a moment...</html>")
            .unwrap_err();
        assert!(matches!(err, WatchError::Parse(_)));
    }

    #[test]
    fn horizon_is_upcoming() {
        assert_eq!(AirdropExtractor::new(utc8()).horizon(), Horizon::Upcoming);
    }
}
