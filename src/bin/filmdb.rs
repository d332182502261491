use clap::{Parser, Subcommand};
use filmdb::*;
use tracing::Level;

mod commands;

use commands::config::ConfigArgs;
use commands::init::InitArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.filmdb/filmdb.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    /// Output format: table (default), markdown, json, json-pretty, json-line
    #[clap(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    /// MongoDB connection string, overrides the configuration
    #[clap(long, global = true)]
    uri: Option<String>,

    /// Target database name, overrides the configuration
    #[clap(long, global = true)]
    database: Option<String>,

    /// Defaults to `init` when omitted
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ensure the collections and indexes exist
    Init(InitArgs),

    /// Show schema status and the index inventory of each collection
    Status,

    /// Probe uniqueness, lookup, sort and text search on a live database
    Verify,

    /// Show the effective configuration
    Config(ConfigArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.debug {
        tracing_subscriber::fmt()
            // filter spans/events with level DEBUG or higher.
            .with_max_level(Level::DEBUG)
            .init();
    }

    let config = match FilmdbConfig::new(&cli.config)
        .and_then(|config| config.with_overrides(cli.uri, cli.database))
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    match cli.command.unwrap_or(Commands::Init(InitArgs::default())) {
        Commands::Init(args) => commands::init::run(&config, args, cli.format).await,
        Commands::Status => commands::status::run(&config, cli.format).await,
        Commands::Verify => commands::verify::run(&config, cli.format).await,
        Commands::Config(args) => commands::config::run(&config, args, cli.format),
    }
}
