use crate::detector::Detector;
use crate::error::PtxError;
use crate::event::Event;
use crate::sources::{expand_globs, gather_files, gather_stdin};
use colored::Colorize;
use std::path::PathBuf;

pub mod extract;
pub mod find;
pub mod formats;
pub mod output;
pub mod query;
pub mod sources;

pub use extract::run_extract;
pub use find::run_find;
pub use formats::run_formats;
pub use query::run_query;
pub use sources::run_sources;

/// Read the named files (or stdin when none are given), detect or force
/// a parser per source, and return the concatenated events. Per-file
/// order is preserved; files appear in argument order.
pub(crate) fn ingest(
    files: &[PathBuf],
    forced_format: Option<&str>,
    verbose: bool,
) -> Result<Vec<Event>, PtxError> {
    let gathered = if files.is_empty() {
        gather_stdin()?
    } else {
        let paths = expand_globs(files)?;
        if paths.is_empty() {
            return Err(PtxError::MissingArgument {
                argument: "files".to_string(),
                message: "no files matched the given patterns".to_string(),
            });
        }
        gather_files(&paths)?
    };

    let detector = Detector::new();
    let mut events = Vec::new();
    let mut scoreable_lines = 0usize;
    let mut undetected_source: Option<String> = None;

    for (label, lines) in &gathered {
        let non_empty = lines.iter().filter(|l| !l.trim().is_empty()).count();
        scoreable_lines += non_empty;

        let parser = match forced_format {
            Some(name) => detector.by_name(name).ok_or_else(|| PtxError::MissingArgument {
                argument: "--format".to_string(),
                message: format!("unknown format '{}' (see `ptx formats`)", name),
            })?,
            None => match detector.detect(lines) {
                Some(parser) => parser,
                None => {
                    undetected_source.get_or_insert_with(|| label.clone());
                    if verbose && non_empty > 0 {
                        eprintln!(
                            "{} {}: no parser recognized the sample",
                            "skipped".yellow(),
                            label
                        );
                    }
                    continue;
                }
            },
        };

        let parsed = parser.parse_many(lines, label);
        if verbose {
            eprintln!(
                "{} {}: {} lines -> {} events, {} dropped [{}]",
                "parsed".green(),
                label,
                non_empty,
                parsed.len(),
                non_empty - parsed.len(),
                parser.format_name()
            );
        }
        events.extend(parsed);
    }

    // Lines went in and nothing came out: surface detection failure
    // instead of silently printing an empty result.
    if events.is_empty() && scoreable_lines > 0 {
        return Err(PtxError::UnknownFormat {
            source: undetected_source
                .unwrap_or_else(|| gathered.first().map(|(l, _)| l.clone()).unwrap_or_default()),
        });
    }
    Ok(events)
}
