use clap::Parser;
use ptx::cli::{Cli, Commands};
use ptx::commands::{run_extract, run_find, run_formats, run_query, run_sources};

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and exit clean; anything
            // else is a user error.
            if e.use_stderr() {
                eprintln!("{}", e);
                std::process::exit(1);
            }
            let _ = e.print();
            std::process::exit(0);
        }
    };

    let verbose = cli.verbose;
    let result = match cli.command {
        Commands::Query(args) => run_query(args, verbose),
        Commands::Find(args) => run_find(args, verbose),
        Commands::Extract(args) => run_extract(args, verbose),
        Commands::Formats => run_formats(),
        Commands::Sources => run_sources(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}
