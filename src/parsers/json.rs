use crate::event::{now_epoch, Event, Value};
use crate::parsers::{parse_iso_epoch, Parser};
use serde_json::Map;

/// Field names probed, in order, for an event timestamp.
const TIMESTAMP_FIELDS: [&str; 10] = [
    "timestamp",
    "time",
    "@timestamp",
    "ts",
    "datetime",
    "date",
    "created_at",
    "createdAt",
    "logged_at",
    "loggedAt",
];

/// Parser for structured-object input: one JSON object per line. Nested
/// maps flatten into dotted field names (`{"req":{"m":"GET"}}` becomes
/// `req.m = "GET"`); lists survive as list-valued leaves.
pub struct JsonParser;

impl JsonParser {
    pub fn new() -> Self {
        Self
    }

    fn flatten(prefix: &str, obj: &Map<String, serde_json::Value>, event: &mut Event) {
        for (key, value) in obj {
            let name = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            match value {
                serde_json::Value::Object(nested) => Self::flatten(&name, nested, event),
                other => {
                    event.fields.insert(name, Value::from_json(other));
                }
            }
        }
    }

    /// Resolve the event timestamp by probing the fixed field-name list:
    /// integer-like scalars are epochs (milliseconds when large enough),
    /// ISO8601 strings are parsed, anything else falls through to now.
    fn resolve_epoch(obj: &Map<String, serde_json::Value>) -> Option<i64> {
        for name in TIMESTAMP_FIELDS {
            let Some(value) = obj.get(name) else {
                continue;
            };
            match value {
                serde_json::Value::Number(n) => {
                    if let Some(epoch) = n.as_i64().or_else(|| n.as_f64().map(|x| x as i64)) {
                        return Some(normalize_epoch(epoch));
                    }
                }
                serde_json::Value::String(s) => {
                    if s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty() {
                        if let Ok(epoch) = s.parse::<i64>() {
                            return Some(normalize_epoch(epoch));
                        }
                    }
                    if let Some(epoch) = parse_iso_epoch(s) {
                        return Some(epoch);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Epochs at or above 1e11 are read as milliseconds.
fn normalize_epoch(epoch: i64) -> i64 {
    if epoch >= 100_000_000_000 {
        epoch / 1000
    } else {
        epoch
    }
}

impl Default for JsonParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for JsonParser {
    fn format_name(&self) -> &str {
        "json"
    }

    fn can_parse(&self, line: &str) -> bool {
        line.trim_start().starts_with('{')
            && serde_json::from_str::<serde_json::Value>(line).is_ok()
    }

    fn parse(&self, line: &str, source: &str) -> Option<Event> {
        if !line.trim_start().starts_with('{') {
            return None;
        }
        let obj = match serde_json::from_str::<serde_json::Value>(line) {
            Ok(serde_json::Value::Object(obj)) => obj,
            _ => return None,
        };

        let mut event = Event::new(source).with_raw(line);
        Self::flatten("", &obj, &mut event);
        event.timestamp = Self::resolve_epoch(&obj).unwrap_or_else(now_epoch).max(0);
        Some(event)
    }
}
