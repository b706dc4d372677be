use crate::cli::{parse_duration_secs, OutputFormat, QueryArgs};
use crate::commands::ingest;
use crate::commands::output::OutputFormatter;
use crate::config::Config;
use crate::error::PtxError;
use crate::event::now_epoch;
use crate::exec::{execute, QueryOutput};
use crate::query::parse_query;
use crate::transform::{EvalTransform, TransformChain};
use clap::ValueEnum;

pub fn run_query(args: QueryArgs, verbose: bool) -> Result<(), PtxError> {
    let config = Config::load()?;

    let query_text = config.resolve_alias(&args.query).to_string();
    let query = parse_query(&query_text)?;

    // Compile the transform before touching any input so a bad --eval
    // fails fast.
    let mut chain = TransformChain::new();
    if let Some(eval) = &args.eval {
        chain.push(Box::new(EvalTransform::parse(eval)?));
    }

    let mut events = ingest(&args.files, args.format.as_deref(), verbose)?;

    let now = now_epoch();
    if let Some(since) = &args.since {
        let cutoff = now - parse_duration_secs(since)?;
        events.retain(|e| e.timestamp >= cutoff);
    }
    if let Some(until) = &args.until {
        let cutoff = now - parse_duration_secs(until)?;
        events.retain(|e| e.timestamp <= cutoff);
    }

    let events = chain.apply(events);
    let mut output = execute(&query, events);

    // The query's own limit already ran inside the executor; the CLI
    // flag (or the configured default) caps on top of it.
    let cap = args.limit.or(if query.limit.is_none() {
        config.defaults.limit
    } else {
        None
    });
    if let Some(cap) = cap {
        match &mut output {
            QueryOutput::Events(events) => events.truncate(cap),
            QueryOutput::Rows(rows) => rows.truncate(cap),
        }
    }

    let format = resolve_output(args.output, &config)?;
    OutputFormatter::new(format).print(&output, &mut std::io::stdout().lock())
}

/// CLI flag wins, then `defaults.output` from config, then the table.
pub(crate) fn resolve_output(
    flag: Option<OutputFormat>,
    config: &Config,
) -> Result<OutputFormat, PtxError> {
    if let Some(format) = flag {
        return Ok(format);
    }
    match &config.defaults.output {
        Some(name) => {
            OutputFormat::from_str(name, true).map_err(|_| PtxError::Config {
                path: crate::config::CONFIG_ENV.to_string(),
                message: format!("unknown defaults.output '{}'", name),
            })
        }
        None => Ok(OutputFormat::Table),
    }
}
