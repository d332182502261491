//! In-memory model of the schema engine
//!
//! `MemoryBackend` reproduces the engine behavior the initializer depends on:
//! an `_id_` index on every new collection, "namespace exists" on duplicate
//! collection creation, identical index creation as a no-op, name and option
//! conflicts, one text index per collection, and unique-key enforcement both
//! on inserts and when building a unique index over existing documents.
//!
//! It backs `init --dry-run` (seeded from the live schema with
//! [`MemoryBackend::snapshot_of`]) and the schema tests.

use super::backend::SchemaBackend;
use super::error::{codes, SchemaError};
use super::schema::{index_state, ExistingIndex, IndexDefinition, IndexKind, IndexState};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default, Clone)]
struct MemoryCollection {
    indexes: Vec<ExistingIndex>,
    documents: Vec<Document>,
}

impl MemoryCollection {
    fn new() -> Self {
        Self {
            indexes: vec![ExistingIndex::id_index()],
            documents: vec![],
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    collections: BTreeMap<String, MemoryCollection>,
}

/// In-memory schema engine
#[derive(Debug)]
pub struct MemoryBackend {
    database: String,
    state: Mutex<MemoryState>,
    unreachable: bool,
    read_only: bool,
}

impl MemoryBackend {
    /// Create an empty database
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            state: Mutex::new(MemoryState::default()),
            unreachable: false,
            read_only: false,
        }
    }

    /// Make every operation fail as if the endpoint were unreachable
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Make every schema modification fail as if the principal lacked rights
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Copy the collections and indexes of another backend
    ///
    /// Documents are not copied.
    pub async fn snapshot_of<B: SchemaBackend + ?Sized>(source: &B) -> Result<Self, SchemaError> {
        let mut collections = BTreeMap::new();
        for name in source.collection_names().await? {
            let indexes = source.indexes(&name).await?;
            collections.insert(
                name,
                MemoryCollection {
                    indexes,
                    documents: vec![],
                },
            );
        }

        let backend = Self::new(source.database_name());
        backend.lock().collections = collections;
        Ok(backend)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_reachable(&self) -> Result<(), SchemaError> {
        if self.unreachable {
            return Err(SchemaError::Connection {
                message: "server selection failed: no reachable servers".to_string(),
            });
        }
        Ok(())
    }

    fn check_writable(&self, target: &str) -> Result<(), SchemaError> {
        self.check_reachable()?;
        if self.read_only {
            return Err(SchemaError::PermissionDenied {
                target: target.to_string(),
                message: format!("not authorized on {} to execute command", self.database),
            });
        }
        Ok(())
    }

    /// Insert a document, creating the collection implicitly
    ///
    /// Fails with [`SchemaError::DuplicateKey`] when a unique index already
    /// holds the document's key.
    pub fn insert(&self, collection: &str, document: Document) -> Result<(), SchemaError> {
        self.check_writable(collection)?;
        let mut state = self.lock();
        let entry = state
            .collections
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new);

        for index in entry.indexes.iter().filter(|index| index.unique) {
            let key = unique_key(index, &document);
            if entry
                .documents
                .iter()
                .any(|existing| unique_key(index, existing) == key)
            {
                return Err(SchemaError::DuplicateKey {
                    collection: collection.to_string(),
                    message: format!(
                        "E{} duplicate key error collection: {}.{} index: {}",
                        codes::DUPLICATE_KEY,
                        self.database,
                        collection,
                        index.name
                    ),
                });
            }
        }

        entry.documents.push(document);
        Ok(())
    }

    /// Add an index without any checks
    pub fn seed_index(&self, collection: &str, index: ExistingIndex) {
        self.lock()
            .collections
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new)
            .indexes
            .push(index);
    }

    /// Number of collections
    pub fn collection_count(&self) -> usize {
        self.lock().collections.len()
    }

    /// Index names of a collection in creation order
    pub fn index_names(&self, collection: &str) -> Vec<String> {
        self.lock()
            .collections
            .get(collection)
            .map(|c| c.indexes.iter().map(|index| index.name.clone()).collect())
            .unwrap_or_default()
    }
}

/// Values a unique index compares; a missing field indexes as null
fn unique_key(index: &ExistingIndex, document: &Document) -> Vec<Bson> {
    index
        .keys
        .iter()
        .filter(|(_, kind)| *kind != IndexKind::Text)
        .map(|(field, _)| document.get(field).cloned().unwrap_or(Bson::Null))
        .collect()
}

#[async_trait]
impl SchemaBackend for MemoryBackend {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn collection_names(&self) -> Result<Vec<String>, SchemaError> {
        self.check_reachable()?;
        Ok(self.lock().collections.keys().cloned().collect())
    }

    async fn create_collection(&self, name: &str) -> Result<(), SchemaError> {
        self.check_writable(name)?;
        let mut state = self.lock();
        if state.collections.contains_key(name) {
            return Err(SchemaError::CollectionExists {
                collection: name.to_string(),
            });
        }
        state
            .collections
            .insert(name.to_string(), MemoryCollection::new());
        Ok(())
    }

    async fn indexes(&self, collection: &str) -> Result<Vec<ExistingIndex>, SchemaError> {
        self.check_reachable()?;
        Ok(self
            .lock()
            .collections
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default())
    }

    async fn create_index(&self, definition: &IndexDefinition) -> Result<String, SchemaError> {
        let name = definition.name();
        self.check_writable(&definition.qualified_name())?;

        let mut state = self.lock();
        let entry = state
            .collections
            .entry(definition.collection.to_string())
            .or_insert_with(MemoryCollection::new);

        match index_state(definition, &entry.indexes) {
            IndexState::Present => return Ok(name),
            IndexState::Conflict(detail) => {
                return Err(SchemaError::DuplicateIndexConflict {
                    collection: definition.collection.to_string(),
                    index: name,
                    detail,
                })
            }
            IndexState::Missing => {}
        }

        let index = ExistingIndex::from_definition(definition);
        if index.unique {
            let mut seen: Vec<Vec<Bson>> = Vec::new();
            for document in &entry.documents {
                let key = unique_key(&index, document);
                if seen.contains(&key) {
                    return Err(SchemaError::DuplicateKey {
                        collection: definition.collection.to_string(),
                        message: format!(
                            "E{} duplicate key error building index {}",
                            codes::DUPLICATE_KEY,
                            name
                        ),
                    });
                }
                seen.push(key);
            }
        }

        entry.indexes.push(index);
        Ok(name)
    }

    async fn document_count(&self, collection: &str) -> Result<u64, SchemaError> {
        self.check_reachable()?;
        Ok(self
            .lock()
            .collections
            .get(collection)
            .map(|c| c.documents.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::core::{SchemaDefinitions, SchemaManager, StepAction};
    use crate::database::records::{StoryRecord, UserRecord};
    use mongodb::bson;

    async fn initialized() -> MemoryBackend {
        let backend = MemoryBackend::new("film_assist_db");
        SchemaManager::new(&backend).initialize().await.unwrap();
        backend
    }

    fn user(username: &str, email: &str) -> Document {
        bson::to_document(&UserRecord::new(username, email, "hash")).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let backend = initialized().await;

        backend.insert("users", user("ana", "ana@example.com")).unwrap();
        let err = backend
            .insert("users", user("ana2", "ana@example.com"))
            .unwrap_err();

        match err {
            SchemaError::DuplicateKey { message, .. } => assert!(message.contains("email_1")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(backend.document_count("users").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let backend = initialized().await;

        backend.insert("users", user("ana", "ana@example.com")).unwrap();
        let err = backend
            .insert("users", user("ana", "other@example.com"))
            .unwrap_err();

        match err {
            SchemaError::DuplicateKey { message, .. } => assert!(message.contains("username_1")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stories_are_not_unique_per_user() {
        let backend = initialized().await;

        for title in ["Night Train", "Blue Hour", "Night Train"] {
            let story = StoryRecord::new("u1", title, "noir");
            backend
                .insert("stories", bson::to_document(&story).unwrap())
                .unwrap();
        }
        assert_eq!(backend.document_count("stories").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unique_index_build_over_duplicates_fails() {
        let backend = MemoryBackend::new("film_assist_db");
        backend.insert("users", user("ana", "ana@example.com")).unwrap();
        backend.insert("users", user("bob", "ana@example.com")).unwrap();

        let err = SchemaManager::new(&backend).initialize().await.unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateKey { .. }));
        assert_eq!(err.server_code(), Some(codes::DUPLICATE_KEY));
    }

    #[tokio::test]
    async fn test_duplicate_collection() {
        let backend = MemoryBackend::new("film_assist_db");
        backend.create_collection("users").await.unwrap();

        let err = backend.create_collection("users").await.unwrap_err();
        assert_eq!(
            err,
            SchemaError::CollectionExists {
                collection: "users".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_identical_index_is_noop() {
        let backend = initialized().await;
        let definition = &SchemaDefinitions::INDEXES[0];

        let name = backend.create_index(definition).await.unwrap();
        assert_eq!(name, "email_1");
        assert_eq!(backend.index_names("users").len(), 3);
    }

    #[tokio::test]
    async fn test_snapshot_dry_run_leaves_source_untouched() {
        let live = MemoryBackend::new("film_assist_db");
        live.create_collection("users").await.unwrap();

        let copy = MemoryBackend::snapshot_of(&live).await.unwrap();
        let report = SchemaManager::new(&copy).initialize().await.unwrap();

        assert_eq!(report.steps[0].action, StepAction::Present);
        assert_eq!(report.created_count(), 6);
        assert_eq!(live.collection_count(), 1);
        assert_eq!(live.index_names("users"), vec!["_id_"]);
    }
}
