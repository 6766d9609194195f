//! `composer-sync` - gateway process and operator CLI for Composer state
//!
//! `serve` runs the repository gateway over JSON lines on stdin/stdout. The
//! other commands open the same data directory directly for inspection and
//! scripted edits.

mod cli;
mod commands;
mod error;
mod util;

use clap::Parser;
use cli::Cli;

fn main() {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    if let Err(e) = util::init_logging(config_path, cli.verbose, cli.quiet)
        && !cli.quiet
    {
        eprintln!("Warning: {e}");
    }

    let result = commands::dispatch(config_path, cli.command);

    if let Err(e) = result {
        if !cli.quiet {
            eprintln!("Error: {e}");
        }
        std::process::exit(e.exit_code());
    }
}
