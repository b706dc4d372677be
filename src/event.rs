use chrono::Utc;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// Field values form a small tagged union. Dotted field names encode
/// flattening of structured inputs; no nested `Map` is stored for
/// flattened parses, but `Map` and `List` survive as leaves where an
/// input genuinely carries them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// String rendering used for comparisons, group keys, and text output.
    /// `Null` renders as the empty string so missing and null sort together.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => format_float(*x),
            Value::Str(s) => s.clone(),
            Value::List(_) | Value::Map(_) => {
                serde_json::to_string(&self.to_json()).unwrap_or_default()
            }
        }
    }

    /// Numeric view of this value, if it has one. Strings qualify only
    /// when they match the numeric shape and parse to a finite number.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(x) if x.is_finite() => Some(*x),
            Value::Str(s) => parse_numeric(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Bridge into `serde_json::Value` for the JSON/YAML/CSV writers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Float(x) => serde_json::Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            serde_json::Value::Array(items) => {
                Value::List(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Render a float the way the query language reads them back: integral
/// values drop the trailing `.0` so `avg_latency=250` round-trips.
fn format_float(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{}", x)
    }
}

fn numeric_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?(\d+\.?\d*|\.\d+)$").expect("numeric shape regex"))
}

/// A string is numeric when it matches `-?(\d+\.?\d*|\.\d+)` and parses
/// to a finite number. All comparisons decide numeric vs. string mode
/// per pair using this test.
pub fn parse_numeric(s: &str) -> Option<f64> {
    if !numeric_shape().is_match(s) {
        return None;
    }
    s.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Seconds since epoch, clamped to zero; event timestamps are never negative.
pub fn now_epoch() -> i64 {
    Utc::now().timestamp().max(0)
}

/// Uniform record every parser emits. Immutable by convention: the
/// pipeline passes events by value and the executor never mutates its
/// input batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Seconds since epoch; never absent, defaults to "now" at parse time
    pub timestamp: i64,
    /// Short provenance label (`"nginx"`, `"k8s:prod/pod"`, a file path)
    pub source: String,
    /// Field map; a name appears at most once by construction
    pub fields: BTreeMap<String, Value>,
    /// Original line, preserved for formatters and text search
    pub raw: Option<String>,
}

impl Event {
    pub fn new(source: &str) -> Self {
        Self {
            timestamp: now_epoch(),
            source: source.to_string(),
            fields: BTreeMap::new(),
            raw: None,
        }
    }

    pub fn with_raw(mut self, raw: &str) -> Self {
        self.raw = Some(raw.to_string());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp.max(0);
        self
    }

    pub fn set_field<V: Into<Value>>(&mut self, name: &str, value: V) {
        self.fields.insert(name.to_string(), value.into());
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Aggregation rows are plain maps, not events: they carry synthesized
/// keys (`count`, `sum_<f>`, ...) and omit the `raw`/`source` contract.
pub type Row = BTreeMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_parse_numeric_shapes() {
        assert_eq!(parse_numeric("200"), Some(200.0));
        assert_eq!(parse_numeric("-3.5"), Some(-3.5));
        assert_eq!(parse_numeric(".25"), Some(0.25));
        assert_eq!(parse_numeric("12."), Some(12.0));
        assert_eq!(parse_numeric("1e3"), None);
        assert_eq!(parse_numeric("abc"), None);
        assert_eq!(parse_numeric(""), None);
        assert_eq!(parse_numeric("12a"), None);
        assert_eq!(parse_numeric("--1"), None);
    }

    #[test]
    fn test_value_render() {
        assert_eq!(Value::Null.render(), "");
        assert_eq!(Value::Bool(true).render(), "true");
        assert_eq!(Value::Int(-7).render(), "-7");
        assert_eq!(Value::Float(250.0).render(), "250");
        assert_eq!(Value::Float(0.5).render(), "0.5");
        assert_eq!(Value::Str("GET".into()).render(), "GET");
        let list = Value::List(vec![Value::Int(1), Value::Str("a".into())]);
        assert_eq!(list.render(), r#"[1,"a"]"#);
    }

    #[test]
    fn test_value_as_numeric() {
        assert_eq!(Value::Int(200).as_numeric(), Some(200.0));
        assert_eq!(Value::Str("200".into()).as_numeric(), Some(200.0));
        assert_eq!(Value::Str("GET".into()).as_numeric(), None);
        assert_eq!(Value::Bool(true).as_numeric(), None);
        assert_eq!(Value::Null.as_numeric(), None);
    }

    #[test]
    fn test_json_round_trip() {
        let json: serde_json::Value = serde_json::from_str(
            r#"{"a": 1, "b": "x", "c": [1, 2], "d": {"e": null}, "f": 1.5}"#,
        )
        .unwrap();
        let value = Value::from_json(&json);
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_event_field_uniqueness() {
        let mut event = Event::new("test");
        event.set_field("status", 200_i64);
        event.set_field("status", 404_i64);
        assert_eq!(event.fields.len(), 1);
        assert_eq!(event.field("status"), Some(&Value::Int(404)));
    }

    #[test]
    fn test_event_timestamp_never_negative() {
        let event = Event::new("test").with_timestamp(-5);
        assert_eq!(event.timestamp, 0);
    }

    #[quickcheck]
    fn prop_int_string_numeric_symmetry(n: i64) -> bool {
        // For a field holding "200" and a literal 200, both views agree.
        let as_string = Value::Str(n.to_string());
        let as_int = Value::Int(n);
        as_string.as_numeric() == as_int.as_numeric()
    }

    #[quickcheck]
    fn prop_render_parse_round_trip(n: i64) -> bool {
        parse_numeric(&Value::Int(n).render()) == Some(n as f64)
    }
}
