use crate::parsers::{HttpParser, JsonParser, Parser, SyslogParser};

/// Number of leading lines scored during detection.
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// Picks the highest-confidence parser for a sample of lines.
///
/// Registration order doubles as the tie-break: with equal scores the
/// earlier parser wins, so detection is deterministic. The detector
/// keeps no state between calls and is safe to share across threads.
pub struct Detector {
    parsers: Vec<Box<dyn Parser>>,
    sample_size: usize,
}

impl Detector {
    /// Standard registry: HTTP-combined, structured-object, syslog.
    /// A user-regex parser joins via [`Detector::register`].
    pub fn new() -> Self {
        Self {
            parsers: vec![
                Box::new(HttpParser::new()),
                Box::new(JsonParser::new()),
                Box::new(SyslogParser::new()),
            ],
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    /// Append a parser at the end of the tie-break order.
    pub fn register(&mut self, parser: Box<dyn Parser>) {
        self.parsers.push(parser);
    }

    pub fn format_names(&self) -> Vec<&str> {
        self.parsers.iter().map(|p| p.format_name()).collect()
    }

    /// Look a parser up by its format name (forced `--format`).
    pub fn by_name(&self, name: &str) -> Option<&dyn Parser> {
        self.parsers
            .iter()
            .find(|p| p.format_name() == name)
            .map(|p| p.as_ref())
    }

    /// Score every registered parser over the first `sample_size` lines
    /// and return the winner, or `None` when nothing scores above zero.
    pub fn detect(&self, lines: &[String]) -> Option<&dyn Parser> {
        let sample: Vec<String> = lines.iter().take(self.sample_size).cloned().collect();
        if sample.iter().all(|l| l.trim().is_empty()) {
            return None;
        }

        let mut best: Option<(&dyn Parser, f64)> = None;
        for parser in &self.parsers {
            let score = parser.confidence(&sample);
            if score <= 0.0 {
                continue;
            }
            match best {
                Some((_, current)) if score <= current => {}
                _ => best = Some((parser.as_ref(), score)),
            }
        }
        best.map(|(parser, _)| parser)
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}
