pub mod import;

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "compras",
    version,
    about = "Import purchases, line items and suppliers from JSON lines into SQLite."
)]
pub struct Cli {
    /// JSON lines files to import, in order (stdin when none; `-` also reads stdin)
    pub files: Vec<PathBuf>,

    /// SQLite database file (default from ~/.config/compras/settings.json)
    #[arg(long, env = "COMPRAS_DB")]
    pub db: Option<PathBuf>,

    /// Year a line item's purchase must be dated in (default: current year)
    #[arg(long, env = "ANIO")]
    pub year: Option<i32>,

    /// Abort on the first malformed line instead of logging and skipping it
    #[arg(long)]
    pub strict: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}
