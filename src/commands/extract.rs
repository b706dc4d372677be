use crate::cli::ExtractArgs;
use crate::commands::ingest;
use crate::commands::output::OutputFormatter;
use crate::commands::query::resolve_output;
use crate::config::Config;
use crate::error::PtxError;
use crate::event::Event;
use crate::exec::QueryOutput;

pub fn run_extract(args: ExtractArgs, verbose: bool) -> Result<(), PtxError> {
    let config = Config::load()?;

    let wanted: Vec<String> = args
        .fields
        .split(',')
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    if wanted.is_empty() {
        return Err(PtxError::MissingArgument {
            argument: "--fields".to_string(),
            message: "expected a comma-separated list of field names".to_string(),
        });
    }

    let events = ingest(&args.files, args.format.as_deref(), verbose)?;
    let mut projected: Vec<Event> = events
        .into_iter()
        .map(|event| project(event, &wanted))
        .collect();
    if let Some(limit) = args.limit {
        projected.truncate(limit);
    }

    let format = resolve_output(args.output, &config)?;
    OutputFormatter::new(format).print(
        &QueryOutput::Events(projected),
        &mut std::io::stdout().lock(),
    )
}

/// Keep only the named fields; timestamp and source travel with the
/// event, the raw line does not survive projection.
fn project(mut event: Event, wanted: &[String]) -> Event {
    event.fields.retain(|name, _| wanted.iter().any(|w| w == name));
    event.raw = None;
    event
}
