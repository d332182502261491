use filmdb::{DatabaseConn, FilmdbConfig, OutputFormat, SchemaError};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

pub mod config;
pub mod init;
pub mod status;
pub mod verify;

/// Connect to the configured database, exiting on failure
pub(crate) async fn connect(config: &FilmdbConfig) -> DatabaseConn {
    match DatabaseConn::open(config).await {
        Ok(conn) => conn,
        Err(e) => fail(&e),
    }
}

/// Report a schema error on stderr and exit with a non-zero status
pub(crate) fn fail(err: &SchemaError) -> ! {
    eprintln!("ERROR: {}", err);
    std::process::exit(1);
}

/// Render rows as a table in the requested style
pub(crate) fn render_table<T: Tabled>(rows: &[T], output_format: OutputFormat) -> String {
    match output_format {
        OutputFormat::Markdown => Table::new(rows).with(Style::markdown()).to_string(),
        _ => Table::new(rows).with(Style::rounded()).to_string(),
    }
}

/// Print a value for one of the JSON formats
///
/// Returns `false` when the format is not a JSON variant.
pub(crate) fn print_json<T: Serialize>(value: &T, output_format: OutputFormat) -> bool {
    match output_format.to_json(value) {
        Some(Ok(json)) => {
            println!("{}", json);
            true
        }
        Some(Err(e)) => {
            eprintln!("Error serializing output: {}", e);
            std::process::exit(1);
        }
        None => false,
    }
}
