use crate::event::{now_epoch, Event};
use crate::parsers::Parser;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

/// Parser for HTTP-server logs. Accepts two shapes on the same parser:
/// the combined access format
/// (`ip ident user [time] "METHOD path HTTP/x.y" status bytes "ref" "ua"`)
/// and the error format
/// (`yyyy/MM/dd HH:MM:SS [level] pid#tid: *conn message`).
pub struct HttpParser {
    access: Regex,
    error: Regex,
    client: Regex,
}

impl HttpParser {
    pub fn new() -> Self {
        Self {
            access: Regex::new(
                r#"^(\S+) (\S+) (\S+) \[([^\]]+)\] "(\S+) ([^"\s]+)(?: (HTTP/[0-9.]+))?" (\d{3}) (\S+)(?: "([^"]*)"(?: "([^"]*)")?)?\s*$"#,
            )
            .expect("access log regex"),
            error: Regex::new(
                r"^(\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}) \[(\w+)\] (\d+)#(\d+): (?:\*(\d+) )?(.*)$",
            )
            .expect("error log regex"),
            client: Regex::new(r"client: ([^,\s]+),").expect("client ip regex"),
        }
    }

    /// Bracketed access-log stamp, e.g. `04/Dec/2025:10:00:00 +0000`.
    fn parse_access_epoch(stamp: &str) -> Option<i64> {
        DateTime::parse_from_str(stamp, "%d/%b/%Y:%H:%M:%S %z")
            .ok()
            .map(|dt| dt.with_timezone(&Utc).timestamp())
    }

    /// Error-log stamp carries no zone; read it as UTC.
    fn parse_error_epoch(stamp: &str) -> Option<i64> {
        NaiveDateTime::parse_from_str(stamp, "%Y/%m/%d %H:%M:%S")
            .ok()
            .map(|dt| dt.and_utc().timestamp())
    }

    fn parse_access(&self, line: &str, source: &str) -> Option<Event> {
        let caps = self.access.captures(line)?;
        let mut event = Event::new(source).with_raw(line);

        event.set_field("ip", caps.get(1)?.as_str());
        event.set_field("ident", caps.get(2)?.as_str());
        event.set_field("user", caps.get(3)?.as_str());
        event.set_field("method", caps.get(5)?.as_str());
        event.set_field("path", caps.get(6)?.as_str());

        let status = caps.get(8)?.as_str().parse::<i64>().unwrap_or(0);
        event.set_field("status", status);

        // `-` means the response carried no body; store zero.
        let bytes_raw = caps.get(9)?.as_str();
        let bytes = if bytes_raw == "-" {
            0
        } else {
            bytes_raw.parse::<i64>().unwrap_or(0)
        };
        event.set_field("bytes", bytes);

        let referer = caps.get(10).map(|m| m.as_str()).unwrap_or("");
        event.set_field("referer", if referer == "-" { "" } else { referer });
        let ua = caps.get(11).map(|m| m.as_str()).unwrap_or("");
        event.set_field("ua", if ua == "-" { "" } else { ua });

        event.set_field("format", "combined");
        event.timestamp = caps
            .get(4)
            .and_then(|m| Self::parse_access_epoch(m.as_str()))
            .unwrap_or_else(now_epoch)
            .max(0);
        Some(event)
    }

    fn parse_error(&self, line: &str, source: &str) -> Option<Event> {
        let caps = self.error.captures(line)?;
        let mut event = Event::new(source).with_raw(line);

        event.set_field("level", caps.get(2)?.as_str());
        event.set_field("pid", caps.get(3)?.as_str().parse::<i64>().unwrap_or(0));
        event.set_field("tid", caps.get(4)?.as_str().parse::<i64>().unwrap_or(0));
        if let Some(conn) = caps.get(5) {
            event.set_field("conn", conn.as_str().parse::<i64>().unwrap_or(0));
        }

        let message = caps.get(6)?.as_str();
        event.set_field("message", message);
        if let Some(client) = self.client.captures(message).and_then(|c| c.get(1)) {
            event.set_field("client_ip", client.as_str());
        }

        event.set_field("format", "error");
        event.timestamp = caps
            .get(1)
            .and_then(|m| Self::parse_error_epoch(m.as_str()))
            .unwrap_or_else(now_epoch)
            .max(0);
        Some(event)
    }
}

impl Default for HttpParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for HttpParser {
    fn format_name(&self) -> &str {
        "http"
    }

    fn can_parse(&self, line: &str) -> bool {
        self.access.is_match(line) || self.error.is_match(line)
    }

    fn parse(&self, line: &str, source: &str) -> Option<Event> {
        if self.access.is_match(line) {
            self.parse_access(line, source)
        } else {
            self.parse_error(line, source)
        }
    }
}
