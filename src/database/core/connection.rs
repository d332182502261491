//! Database connection management
//!
//! This module provides the MongoDB connection wrapper used throughout filmdb.

use super::backend::SchemaBackend;
use super::error::{codes, SchemaError};
use super::schema::{ExistingIndex, IndexDefinition};
use crate::config::FilmdbConfig;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use std::time::Duration;
use tracing::debug;

/// Core database connection wrapper
///
/// `DatabaseConn` holds the selected target database of a MongoDB client.
/// The database itself is created by the engine on the first write.
pub struct DatabaseConn {
    db: Database,
}

impl DatabaseConn {
    /// Connect to the configured endpoint and select the configured database
    ///
    /// The driver connects lazily; the endpoint is pinged so an unreachable
    /// server surfaces here as [`SchemaError::Connection`].
    pub async fn open(config: &FilmdbConfig) -> Result<Self, SchemaError> {
        let mut options = ClientOptions::parse(&config.mongodb_uri)
            .await
            .map_err(|e| SchemaError::Connection {
                message: format!("invalid MongoDB URI '{}': {}", config.redacted_uri(), e),
            })?;

        if let Some(app_name) = &config.app_name {
            options.app_name = Some(app_name.clone());
        }
        if let Some(secs) = config.connect_timeout_secs {
            options.connect_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = config.server_selection_timeout_secs {
            options.server_selection_timeout = Some(Duration::from_secs(secs));
        }

        let client = Client::with_options(options)
            .map_err(|e| SchemaError::classify(e, &config.database, None))?;
        let db = client.database(&config.database);

        let conn = DatabaseConn { db };
        conn.ping().await?;
        debug!(
            "Connected to {} (database '{}')",
            config.redacted_uri(),
            config.database
        );
        Ok(conn)
    }

    /// Round-trip a `ping` to the server
    pub async fn ping(&self) -> Result<(), SchemaError> {
        self.db
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| SchemaError::classify(e, self.db.name(), None))?;
        Ok(())
    }

    /// The selected database
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Run a database command, classifying failures against `collection`
    pub async fn run_command(
        &self,
        collection: &str,
        command: Document,
    ) -> Result<Document, SchemaError> {
        self.db
            .run_command(command)
            .await
            .map_err(|e| SchemaError::classify(e, collection, None))
    }
}

#[async_trait]
impl SchemaBackend for DatabaseConn {
    fn database_name(&self) -> &str {
        self.db.name()
    }

    async fn collection_names(&self) -> Result<Vec<String>, SchemaError> {
        self.db
            .list_collection_names()
            .await
            .map_err(|e| SchemaError::classify(e, self.db.name(), None))
    }

    async fn create_collection(&self, name: &str) -> Result<(), SchemaError> {
        self.db
            .create_collection(name)
            .await
            .map_err(|e| SchemaError::classify(e, name, None))
    }

    async fn indexes(&self, collection: &str) -> Result<Vec<ExistingIndex>, SchemaError> {
        let coll = self.db.collection::<Document>(collection);
        let cursor = match coll.list_indexes().await {
            Ok(cursor) => cursor,
            Err(e) => {
                return match SchemaError::classify(e, collection, None) {
                    err if err.server_code() == Some(codes::NAMESPACE_NOT_FOUND) => Ok(vec![]),
                    err => Err(err),
                }
            }
        };

        let models: Vec<mongodb::IndexModel> = cursor
            .try_collect()
            .await
            .map_err(|e| SchemaError::classify(e, collection, None))?;

        Ok(models.iter().filter_map(ExistingIndex::from_model).collect())
    }

    async fn create_index(&self, definition: &IndexDefinition) -> Result<String, SchemaError> {
        let name = definition.name();
        let result = self
            .db
            .collection::<Document>(definition.collection)
            .create_index(definition.to_model())
            .await
            .map_err(|e| SchemaError::classify(e, definition.collection, Some(&name)))?;
        Ok(result.index_name)
    }

    async fn document_count(&self, collection: &str) -> Result<u64, SchemaError> {
        self.db
            .collection::<Document>(collection)
            .estimated_document_count()
            .await
            .map_err(|e| SchemaError::classify(e, collection, None))
    }
}
