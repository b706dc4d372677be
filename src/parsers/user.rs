use crate::event::{now_epoch, Event, Value};
use crate::error::PtxError;
use crate::parsers::{parse_iso_epoch, Parser};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::collections::HashMap;

/// Per-field coercion applied to named captures. Failures map to the
/// type's zero value rather than dropping the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCoercion {
    Int,
    Float,
    Bool,
    Lower,
    Upper,
}

impl FieldCoercion {
    pub fn from_name(name: &str) -> Option<FieldCoercion> {
        match name.to_lowercase().as_str() {
            "int" => Some(FieldCoercion::Int),
            "float" => Some(FieldCoercion::Float),
            "bool" => Some(FieldCoercion::Bool),
            "lower" => Some(FieldCoercion::Lower),
            "upper" => Some(FieldCoercion::Upper),
            _ => None,
        }
    }

    fn apply(&self, raw: &str) -> Value {
        match self {
            FieldCoercion::Int => Value::Int(raw.parse::<i64>().unwrap_or(0)),
            FieldCoercion::Float => Value::Float(raw.parse::<f64>().unwrap_or(0.0)),
            FieldCoercion::Bool => {
                Value::Bool(matches!(raw.to_lowercase().as_str(), "true" | "1"))
            }
            FieldCoercion::Lower => Value::Str(raw.to_lowercase()),
            FieldCoercion::Upper => Value::Str(raw.to_uppercase()),
        }
    }
}

/// Configuration for a user-defined regex format.
#[derive(Debug, Clone, Default)]
pub struct UserRegexConfig {
    /// Pattern with named captures; each capture becomes a field
    pub pattern: String,
    /// Named field holding the event timestamp
    pub timestamp_field: Option<String>,
    /// chrono format string for that field; ISO8601 is tried without one
    pub timestamp_format: Option<String>,
    /// Field name -> coercion
    pub types: HashMap<String, FieldCoercion>,
}

/// Parser driven by a user-supplied regex with named capture groups.
pub struct UserRegexParser {
    regex: Regex,
    config: UserRegexConfig,
}

impl UserRegexParser {
    pub fn new(config: UserRegexConfig) -> Result<Self, PtxError> {
        let regex = Regex::new(&config.pattern).map_err(|e| PtxError::MissingArgument {
            argument: "pattern".to_string(),
            message: format!("invalid regex: {}", e),
        })?;
        if regex.capture_names().flatten().next().is_none() {
            return Err(PtxError::MissingArgument {
                argument: "pattern".to_string(),
                message: "pattern has no named capture groups".to_string(),
            });
        }
        Ok(Self { regex, config })
    }

    fn resolve_epoch(&self, raw: &str) -> Option<i64> {
        if let Some(layout) = &self.config.timestamp_format {
            if layout.contains("%z") || layout.contains("%:z") {
                if let Ok(dt) = DateTime::parse_from_str(raw, layout) {
                    return Some(dt.with_timezone(&Utc).timestamp());
                }
            } else if let Ok(dt) = NaiveDateTime::parse_from_str(raw, layout) {
                return Some(dt.and_utc().timestamp());
            }
            return None;
        }
        parse_iso_epoch(raw)
    }
}

impl Parser for UserRegexParser {
    fn format_name(&self) -> &str {
        "regex"
    }

    fn can_parse(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    fn parse(&self, line: &str, source: &str) -> Option<Event> {
        let caps = self.regex.captures(line)?;
        let mut event = Event::new(source).with_raw(line);
        let mut stamp_raw: Option<String> = None;

        for name in self.regex.capture_names().flatten() {
            let Some(m) = caps.name(name) else {
                continue;
            };
            let raw = m.as_str();
            if self.config.timestamp_field.as_deref() == Some(name) {
                stamp_raw = Some(raw.to_string());
            }
            let value = match self.config.types.get(name) {
                Some(coercion) => coercion.apply(raw),
                None => Value::Str(raw.to_string()),
            };
            event.fields.insert(name.to_string(), value);
        }

        event.timestamp = stamp_raw
            .and_then(|raw| self.resolve_epoch(&raw))
            .unwrap_or_else(now_epoch)
            .max(0);
        Some(event)
    }
}
