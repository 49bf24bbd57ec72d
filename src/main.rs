//! contentsync CLI entry point.

use clap::Parser;
use contentsync::cli::commands;
use contentsync::cli::{Cli, Commands};
use contentsync::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    match run(&cli, cli.json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    match &cli.command {
        Commands::Init { force } => {
            commands::init::execute(cli.root.as_deref(), cli.db.as_deref(), *force, json)
        }
        Commands::Export => commands::sync::export(cli, json),
        Commands::Import { no_resolve } => commands::sync::import(cli, *no_resolve, json),
        Commands::Start => commands::start::execute(cli, json),
        Commands::Status => commands::sync::status(cli, json),
        Commands::Pairs { limit } => commands::sync::pairs(cli, *limit, json),
        Commands::History { id, limit } => commands::sync::history(cli, *id, *limit, json),
        Commands::Type { command } => commands::types::execute(command, cli, json),
        Commands::Completions { shell } => commands::completions::execute(shell),
        Commands::Version => commands::version::execute(json),
    }
}
