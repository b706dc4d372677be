use crate::cli::FindArgs;
use crate::commands::ingest;
use crate::commands::output::OutputFormatter;
use crate::commands::query::resolve_output;
use crate::config::Config;
use crate::error::PtxError;
use crate::event::{Event, Value};
use crate::exec::QueryOutput;
use regex::Regex;

pub fn run_find(args: FindArgs, verbose: bool) -> Result<(), PtxError> {
    let config = Config::load()?;

    let pattern = Regex::new(&format!("(?i){}", args.pattern)).map_err(|e| {
        PtxError::MissingArgument {
            argument: "pattern".to_string(),
            message: format!("invalid regex: {}", e),
        }
    })?;

    let events = ingest(&args.files, args.format.as_deref(), verbose)?;
    let mut matches: Vec<Event> = events
        .into_iter()
        .filter(|event| event_matches(event, &pattern))
        .collect();
    if let Some(limit) = args.limit {
        matches.truncate(limit);
    }

    let format = resolve_output(args.output, &config)?;
    OutputFormatter::new(format).print(
        &QueryOutput::Events(matches),
        &mut std::io::stdout().lock(),
    )
}

/// A hit anywhere counts: the raw line or any field's string rendering.
fn event_matches(event: &Event, pattern: &Regex) -> bool {
    if let Some(raw) = &event.raw {
        if pattern.is_match(raw) {
            return true;
        }
    }
    event
        .fields
        .values()
        .any(|value| pattern.is_match(&Value::render(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(raw: Option<&str>, fields: &[(&str, Value)]) -> Event {
        let mut e = Event::new("test");
        e.raw = raw.map(str::to_string);
        for (name, value) in fields {
            e.fields.insert(name.to_string(), value.clone());
        }
        e
    }

    #[test]
    fn test_matches_raw_case_insensitive() {
        let pattern = Regex::new("(?i)timeout").unwrap();
        let hit = event(Some("upstream TIMEOUT while reading"), &[]);
        let miss = event(Some("connection reset"), &[]);
        assert!(event_matches(&hit, &pattern));
        assert!(!event_matches(&miss, &pattern));
    }

    #[test]
    fn test_matches_field_renderings() {
        let pattern = Regex::new("(?i)5\\d\\d").unwrap();
        let hit = event(None, &[("status", Value::Int(502))]);
        let miss = event(None, &[("status", Value::Int(200))]);
        assert!(event_matches(&hit, &pattern));
        assert!(!event_matches(&miss, &pattern));
    }
}
