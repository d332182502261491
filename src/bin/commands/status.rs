use filmdb::{FilmdbConfig, OutputFormat, SchemaManager, SchemaSnapshot, SchemaStatus};
use tabled::Tabled;

use super::{connect, fail, print_json, render_table};

#[derive(Tabled)]
struct CollectionRow {
    collection: String,
    exists: bool,
    documents: String,
    indexes: String,
    unexpected: String,
}

pub async fn run(config: &FilmdbConfig, output_format: OutputFormat) {
    let conn = connect(config).await;

    let snapshot = match SchemaManager::new(&conn).inspect().await {
        Ok(snapshot) => snapshot,
        Err(e) => fail(&e),
    };

    if print_json(&snapshot, output_format) {
        return;
    }
    print_status(&snapshot, output_format);
}

fn print_status(snapshot: &SchemaSnapshot, output_format: OutputFormat) {
    println!("filmdb Schema Status");
    println!("====================\n");
    println!("Database:       {}", snapshot.database);
    println!("Status:         {}", snapshot.status);

    match &snapshot.status {
        SchemaStatus::Incomplete {
            missing_collections,
            missing_indexes,
        } => {
            for name in missing_collections {
                println!("  missing collection: {}", name);
            }
            for name in missing_indexes {
                println!("  missing index:      {}", name);
            }
            println!("\nRun `filmdb init` to create the missing objects.");
        }
        SchemaStatus::Conflicting { conflicts } => {
            for conflict in conflicts {
                println!("  conflict: {}", conflict);
            }
            println!("\nConflicting indexes must be resolved manually.");
        }
        SchemaStatus::NotInitialized => {
            println!("\nRun `filmdb init` to create the schema.");
        }
        SchemaStatus::Current => {}
    }
    println!();

    let rows: Vec<CollectionRow> = snapshot
        .collections
        .iter()
        .map(|c| CollectionRow {
            collection: c.name.clone(),
            exists: c.exists,
            documents: c
                .document_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            indexes: c.indexes.join(", "),
            unexpected: c.unexpected.join(", "),
        })
        .collect();
    println!("{}", render_table(&rows, output_format));
}
