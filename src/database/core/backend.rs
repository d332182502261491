//! Schema backend abstraction
//!
//! The initializer only needs four schema operations from the engine plus a
//! document count for status output. [`SchemaBackend`] captures exactly that,
//! so the same [`SchemaManager`](super::SchemaManager) drives the live
//! MongoDB connection and the in-memory engine model used for dry runs.

use super::error::SchemaError;
use super::schema::{ExistingIndex, IndexDefinition};
use async_trait::async_trait;

/// Engine operations used by schema initialization and inspection
#[async_trait]
pub trait SchemaBackend: Send + Sync {
    /// Name of the target database
    fn database_name(&self) -> &str;

    /// Names of the collections in the target database
    async fn collection_names(&self) -> Result<Vec<String>, SchemaError>;

    /// Create a collection
    ///
    /// Fails with [`SchemaError::CollectionExists`] if it is already there.
    async fn create_collection(&self, name: &str) -> Result<(), SchemaError>;

    /// Indexes present on a collection, including `_id_`
    ///
    /// A missing collection has no indexes.
    async fn indexes(&self, collection: &str) -> Result<Vec<ExistingIndex>, SchemaError>;

    /// Create an index and return the name the engine assigned
    async fn create_index(&self, definition: &IndexDefinition) -> Result<String, SchemaError>;

    /// Estimated number of documents in a collection
    async fn document_count(&self, collection: &str) -> Result<u64, SchemaError>;
}
