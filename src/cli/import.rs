use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use colored::Colorize;
use tracing::info;

use crate::cli::Cli;
use crate::db;
use crate::error::{ImportError, Result};
use crate::importer::{import_jsonlines, ImportOptions, RunSummary};
use crate::settings::load_settings;

pub fn run(cli: &Cli) -> Result<()> {
    let settings = load_settings()?;
    let db_path = settings.resolve_database(cli.db.as_deref());
    let options = ImportOptions {
        year: settings.resolve_year(cli.year),
        strict: cli.strict,
    };
    info!(database = %db_path.display(), year = options.year, "Starting import");

    if cli.files.is_empty() {
        return import_source(&db_path, "-", &options);
    }
    for file in &cli.files {
        import_source(&db_path, &file.to_string_lossy(), &options)?;
    }
    Ok(())
}

/// Imports one source with its own connection, closed before the next source starts.
fn import_source(db_path: &Path, source: &str, options: &ImportOptions) -> Result<()> {
    let (reader, name): (Box<dyn Read>, &str) = if source == "-" {
        (Box::new(io::stdin().lock()), "<stdin>")
    } else {
        let file = File::open(source).map_err(|e| ImportError::Source {
            path: source.to_string(),
            source: e,
        })?;
        (Box::new(BufReader::new(file)), source)
    };

    let conn = db::get_connection(db_path)?;
    let summary = import_jsonlines(&conn, reader, name, options)?;
    db::close(conn)?;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let failed = summary.failed();
    let failed = if failed > 0 {
        format!("{failed} failed").red()
    } else {
        format!("{failed} failed").normal()
    };
    println!(
        "{}: {} compras, {} lineas, {} proveedores, {} skipped, {}",
        summary.source.bold(),
        summary.compras.imported.to_string().green(),
        summary.lineas.imported.to_string().green(),
        summary.proveedores.imported.to_string().green(),
        summary.lineas.skipped + summary.unknown,
        failed,
    );
}
