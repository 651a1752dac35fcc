mod classifier;
mod cli;
mod db;
mod error;
mod importer;
mod logging;
mod mappers;
mod models;
mod settings;
mod store;

use clap::Parser;

use cli::Cli;
use logging::{init_logging, LogLevel};

fn main() {
    let cli = Cli::parse();

    let result = init_logging(LogLevel::from_verbose(cli.verbose)).and_then(|()| cli::import::run(&cli));

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
