use crate::event::{now_epoch, Event};
use crate::parsers::{parse_iso_epoch, Parser};
use chrono::{Datelike, NaiveDateTime, Utc};
use regex::Regex;

/// Facility names per RFC 5424, indexed by `PRI / 8`.
const FACILITIES: [&str; 24] = [
    "kern", "user", "mail", "daemon", "auth", "syslog", "lpr", "news", "uucp", "cron", "authpriv",
    "ftp", "ntp", "audit", "alert", "clockd", "local0", "local1", "local2", "local3", "local4",
    "local5", "local6", "local7",
];

/// Severity names per RFC 5424, indexed by `PRI % 8`.
const SEVERITIES: [&str; 8] = [
    "emerg", "alert", "crit", "err", "warning", "notice", "info", "debug",
];

/// Parser for syslog lines in both wire formats: RFC5424
/// (`<PRI>VERSION TIMESTAMP HOSTNAME APPNAME PROCID MSGID SD MSG`) and
/// BSD (`Mon day HH:MM:SS host program[pid]: message`, optionally
/// priority-tagged). BSD stamps carry no year; the current year is
/// assumed, which is wrong across a year boundary.
pub struct SyslogParser {
    rfc5424: Regex,
    bsd: Regex,
}

impl SyslogParser {
    pub fn new() -> Self {
        Self {
            rfc5424: Regex::new(r"^<(\d{1,3})>(\d{1,2}) (\S+) (\S+) (\S+) (\S+) (\S+) (.*)$")
                .expect("rfc5424 regex"),
            bsd: Regex::new(
                r"^(?:<(\d{1,3})>)?([A-Z][a-z]{2}) +(\d{1,2}) (\d{2}:\d{2}:\d{2}) (\S+) ([^:\s\[]+)(?:\[(\d+)\])?: ?(.*)$",
            )
            .expect("bsd regex"),
        }
    }

    fn set_priority_fields(event: &mut Event, pri: i64) {
        event.set_field("priority", pri);
        let facility = (pri / 8) as usize;
        let severity = (pri % 8) as usize;
        if let Some(name) = FACILITIES.get(facility) {
            event.set_field("facility", *name);
        }
        event.set_field("severity", SEVERITIES[severity]);
    }

    /// Split structured data off the tail of an RFC5424 line. Returns the
    /// SD span (`None` when it is `-`) and the remaining message.
    fn split_structured_data(rest: &str) -> (Option<&str>, Option<&str>) {
        if let Some(tail) = rest.strip_prefix('-') {
            let msg = tail.strip_prefix(' ').filter(|m| !m.is_empty());
            return (None, msg);
        }
        if !rest.starts_with('[') {
            return (None, Some(rest).filter(|m| !m.is_empty()));
        }
        // SD-elements are back-to-back bracket groups; `\]` inside a
        // param value does not close the group.
        let bytes = rest.as_bytes();
        let mut i = 0;
        while i < bytes.len() && bytes[i] == b'[' {
            i += 1;
            let mut escaped = false;
            while i < bytes.len() {
                match bytes[i] {
                    b'\\' if !escaped => escaped = true,
                    b']' if !escaped => break,
                    _ => escaped = false,
                }
                i += 1;
            }
            if i >= bytes.len() {
                // Unterminated group; treat the whole tail as SD.
                return (Some(rest), None);
            }
            i += 1;
        }
        let sd = &rest[..i];
        let msg = rest[i..].strip_prefix(' ').filter(|m| !m.is_empty());
        (Some(sd), msg)
    }

    fn parse_rfc5424(&self, line: &str, source: &str) -> Option<Event> {
        let caps = self.rfc5424.captures(line)?;
        let pri = caps.get(1)?.as_str().parse::<i64>().ok()?;
        if pri > 191 {
            return None;
        }

        let mut event = Event::new(source).with_raw(line);
        Self::set_priority_fields(&mut event, pri);
        event.set_field("version", caps.get(2)?.as_str().parse::<i64>().unwrap_or(1));
        event.set_field("hostname", caps.get(4)?.as_str());
        event.set_field("appname", caps.get(5)?.as_str());
        event.set_field("procid", caps.get(6)?.as_str());
        event.set_field("msgid", caps.get(7)?.as_str());

        let (sd, msg) = Self::split_structured_data(caps.get(8)?.as_str());
        if let Some(sd) = sd {
            event.set_field("sd", sd);
        }
        event.set_field("message", msg.unwrap_or(""));

        event.set_field("format", "rfc5424");
        event.timestamp = parse_iso_epoch(caps.get(3)?.as_str())
            .unwrap_or_else(now_epoch)
            .max(0);
        Some(event)
    }

    fn parse_bsd(&self, line: &str, source: &str) -> Option<Event> {
        let caps = self.bsd.captures(line)?;
        let mut event = Event::new(source).with_raw(line);

        if let Some(pri) = caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok()) {
            if pri > 191 {
                return None;
            }
            Self::set_priority_fields(&mut event, pri);
        }

        event.set_field("hostname", caps.get(5)?.as_str());
        event.set_field("program", caps.get(6)?.as_str());
        if let Some(pid) = caps.get(7) {
            event.set_field("pid", pid.as_str().parse::<i64>().unwrap_or(0));
        }
        event.set_field("message", caps.get(8)?.as_str());

        event.set_field("format", "bsd");
        let stamp = format!(
            "{} {} {} {}",
            Utc::now().year(),
            caps.get(2)?.as_str(),
            caps.get(3)?.as_str(),
            caps.get(4)?.as_str(),
        );
        event.timestamp = NaiveDateTime::parse_from_str(&stamp, "%Y %b %d %H:%M:%S")
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or_else(|_| now_epoch())
            .max(0);
        Some(event)
    }
}

impl Default for SyslogParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for SyslogParser {
    fn format_name(&self) -> &str {
        "syslog"
    }

    fn can_parse(&self, line: &str) -> bool {
        self.rfc5424.is_match(line) || self.bsd.is_match(line)
    }

    fn parse(&self, line: &str, source: &str) -> Option<Event> {
        if self.rfc5424.is_match(line) {
            self.parse_rfc5424(line, source)
        } else {
            self.parse_bsd(line, source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Value;

    fn field_str(event: &Event, name: &str) -> String {
        event.field(name).map(Value::render).unwrap_or_default()
    }

    #[test]
    fn test_rfc5424_basic() {
        let parser = SyslogParser::new();
        let line = "<134>1 2025-12-04T10:00:00Z host app 1234 ID47 - Hi";
        let event = parser.parse(line, "syslog").expect("parses");

        assert_eq!(event.field("priority"), Some(&Value::Int(134)));
        assert_eq!(field_str(&event, "facility"), "local0");
        assert_eq!(field_str(&event, "severity"), "info");
        assert_eq!(field_str(&event, "hostname"), "host");
        assert_eq!(field_str(&event, "appname"), "app");
        assert_eq!(field_str(&event, "procid"), "1234");
        assert_eq!(field_str(&event, "msgid"), "ID47");
        assert_eq!(field_str(&event, "message"), "Hi");
        assert_eq!(field_str(&event, "format"), "rfc5424");
        assert!(event.field("sd").is_none());
        assert_eq!(event.timestamp, 1764842400);
    }

    #[test]
    fn test_rfc5424_structured_data_preserved() {
        let parser = SyslogParser::new();
        let line = r#"<165>1 2025-12-04T10:00:00Z web01 cron 77 - [meta seq="12"][origin ip="10.0.0.1"] job done"#;
        let event = parser.parse(line, "syslog").expect("parses");

        assert_eq!(
            field_str(&event, "sd"),
            r#"[meta seq="12"][origin ip="10.0.0.1"]"#
        );
        assert_eq!(field_str(&event, "message"), "job done");
        assert_eq!(field_str(&event, "facility"), "local4");
        assert_eq!(field_str(&event, "severity"), "notice");
    }

    #[test]
    fn test_rfc5424_escaped_bracket_in_sd() {
        let parser = SyslogParser::new();
        let line = r#"<13>1 2025-12-04T10:00:00Z h a p m [x k="a\]b"] tail"#;
        let event = parser.parse(line, "syslog").expect("parses");
        assert_eq!(field_str(&event, "sd"), r#"[x k="a\]b"]"#);
        assert_eq!(field_str(&event, "message"), "tail");
    }

    #[test]
    fn test_rfc5424_priority_out_of_range_rejected() {
        let parser = SyslogParser::new();
        assert_eq!(
            parser.parse("<999>1 2025-12-04T10:00:00Z h a p m - x", "s"),
            None
        );
    }

    #[test]
    fn test_bsd_with_pid() {
        let parser = SyslogParser::new();
        let line = "Dec  4 10:00:00 box sshd[4321]: Accepted publickey for root";
        let event = parser.parse(line, "syslog").expect("parses");

        assert_eq!(field_str(&event, "hostname"), "box");
        assert_eq!(field_str(&event, "program"), "sshd");
        assert_eq!(event.field("pid"), Some(&Value::Int(4321)));
        assert_eq!(field_str(&event, "message"), "Accepted publickey for root");
        assert_eq!(field_str(&event, "format"), "bsd");
        // Year is assumed current; only check the sub-year components held.
        let ts = chrono::DateTime::from_timestamp(event.timestamp, 0).unwrap();
        assert_eq!(ts.format("%m-%d %H:%M:%S").to_string(), "12-04 10:00:00");
    }

    #[test]
    fn test_bsd_priority_tagged() {
        let parser = SyslogParser::new();
        let line = "<34>Oct 11 22:14:15 mymachine su: 'su root' failed for lonvick";
        let event = parser.parse(line, "syslog").expect("parses");

        assert_eq!(event.field("priority"), Some(&Value::Int(34)));
        assert_eq!(field_str(&event, "facility"), "auth");
        assert_eq!(field_str(&event, "severity"), "crit");
        assert_eq!(field_str(&event, "program"), "su");
        assert_eq!(field_str(&event, "message"), "'su root' failed for lonvick");
    }

    #[test]
    fn test_bsd_without_pid() {
        let parser = SyslogParser::new();
        let line = "Jan  9 03:12:45 gw dhclient: renewing lease";
        let event = parser.parse(line, "syslog").expect("parses");
        assert!(event.field("pid").is_none());
        assert_eq!(field_str(&event, "program"), "dhclient");
    }

    #[test]
    fn test_rejects_non_syslog() {
        let parser = SyslogParser::new();
        for line in ["", "{\"a\":1}", "10.0.0.1 - - [x] \"GET / HTTP/1.1\" 200 1"] {
            assert!(!parser.can_parse(line), "line: {:?}", line);
            assert_eq!(parser.parse(line, "s"), None);
        }
    }

    #[test]
    fn test_facility_severity_tables() {
        // 0 -> kern/emerg, 191 -> local7/debug
        let parser = SyslogParser::new();
        let low = parser
            .parse("<0>1 2025-01-01T00:00:00Z h a p m - x", "s")
            .unwrap();
        assert_eq!(field_str(&low, "facility"), "kern");
        assert_eq!(field_str(&low, "severity"), "emerg");

        let high = parser
            .parse("<191>1 2025-01-01T00:00:00Z h a p m - x", "s")
            .unwrap();
        assert_eq!(field_str(&high, "facility"), "local7");
        assert_eq!(field_str(&high, "severity"), "debug");
    }
}
