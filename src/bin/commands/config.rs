use clap::Args;
use filmdb::{FilmdbConfig, OutputFormat, SchemaDefinitions};
use serde::Serialize;

/// Arguments for the Config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Also list the declared collections and indexes
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
struct ConfigInfo {
    mongodb_uri: String,
    database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    app_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    connect_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_selection_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    declared: Option<DeclaredSchema>,
}

#[derive(Debug, Serialize)]
struct DeclaredSchema {
    collections: Vec<&'static str>,
    indexes: Vec<DeclaredIndex>,
}

#[derive(Debug, Serialize)]
struct DeclaredIndex {
    collection: &'static str,
    name: String,
    shape: String,
}

pub fn run(config: &FilmdbConfig, args: ConfigArgs, output_format: OutputFormat) {
    let ConfigArgs { verbose } = args;

    let declared = verbose.then(|| DeclaredSchema {
        collections: SchemaDefinitions::COLLECTIONS.to_vec(),
        indexes: SchemaDefinitions::INDEXES
            .iter()
            .map(|definition| DeclaredIndex {
                collection: definition.collection,
                name: definition.name(),
                shape: definition.describe(),
            })
            .collect(),
    });

    let info = ConfigInfo {
        mongodb_uri: config.redacted_uri(),
        database: config.database.clone(),
        app_name: config.app_name.clone(),
        connect_timeout_secs: config.connect_timeout_secs,
        server_selection_timeout_secs: config.server_selection_timeout_secs,
        declared,
    };

    if super::print_json(&info, output_format) {
        return;
    }

    println!("{}", config.summary());
    if let Some(declared) = info.declared {
        println!("\nDeclared schema:");
        for collection in declared.collections {
            println!("  collection {}", collection);
        }
        for index in declared.indexes {
            println!("  index      {}.{} {}", index.collection, index.name, index.shape);
        }
    }
}
