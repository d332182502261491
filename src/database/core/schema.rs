//! Database schema management
//!
//! This module provides the declared schema of the film-assist database (two
//! collections and five indexes) and the manager that converges a database
//! onto it. Every step is an "ensure": objects already present in the declared
//! shape are left alone, and objects present in a different shape are reported
//! as conflicts and never altered.

use super::backend::SchemaBackend;
use super::error::SchemaError;
use crate::database::records::fields;
use mongodb::bson::{Bson, Document};
use mongodb::options::IndexOptions;
use mongodb::IndexModel;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Database name used when none is configured
pub const DEFAULT_DATABASE: &str = "film_assist_db";

/// Name of the index MongoDB creates on `_id` for every collection
pub const ID_INDEX_NAME: &str = "_id_";

/// Direction or type of a single index key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Ascending,
    Descending,
    Text,
    /// Any key type this tool never declares (hashed, 2dsphere, ...)
    Other,
}

impl IndexKind {
    /// Value of this key in an index specification document
    pub fn to_bson(self) -> Bson {
        match self {
            IndexKind::Ascending => Bson::Int32(1),
            IndexKind::Descending => Bson::Int32(-1),
            IndexKind::Text => Bson::String("text".to_string()),
            IndexKind::Other => Bson::Null,
        }
    }

    /// Parse a key value as reported by the engine
    pub fn from_bson(value: &Bson) -> Self {
        let direction = match value {
            Bson::Int32(v) => Some(*v as f64),
            Bson::Int64(v) => Some(*v as f64),
            Bson::Double(v) => Some(*v),
            Bson::String(s) if s == "text" => return IndexKind::Text,
            _ => None,
        };
        match direction {
            Some(d) if d > 0.0 => IndexKind::Ascending,
            Some(d) if d < 0.0 => IndexKind::Descending,
            _ => IndexKind::Other,
        }
    }

    /// Suffix used by the engine when naming an index after its keys
    fn name_suffix(self) -> &'static str {
        match self {
            IndexKind::Ascending => "1",
            IndexKind::Descending => "-1",
            IndexKind::Text => "text",
            IndexKind::Other => "other",
        }
    }
}

/// A declared index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDefinition {
    pub collection: &'static str,
    pub fields: &'static [(&'static str, IndexKind)],
    pub unique: bool,
}

impl IndexDefinition {
    /// Index name, following the engine's default naming
    pub fn name(&self) -> String {
        self.fields
            .iter()
            .map(|(field, kind)| format!("{}_{}", field, kind.name_suffix()))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// `collection.index` form used in reports
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.collection, self.name())
    }

    /// Key specification document, e.g. `{ created_at: -1 }`
    pub fn keys(&self) -> Document {
        let mut keys = Document::new();
        for (field, kind) in self.fields {
            keys.insert(*field, kind.to_bson());
        }
        keys
    }

    pub fn is_text(&self) -> bool {
        self.fields.iter().any(|(_, kind)| *kind == IndexKind::Text)
    }

    /// Driver model for `createIndexes`
    pub fn to_model(&self) -> IndexModel {
        let options = if self.unique {
            IndexOptions::builder().name(self.name()).unique(true).build()
        } else {
            IndexOptions::builder().name(self.name()).build()
        };
        IndexModel::builder()
            .keys(self.keys())
            .options(options)
            .build()
    }

    fn normalized_keys(&self) -> Vec<(String, IndexKind)> {
        normalize_keys(
            self.fields
                .iter()
                .map(|(field, kind)| (field.to_string(), *kind))
                .collect(),
        )
    }

    /// Human-readable shape, e.g. `{email: 1} unique`
    pub fn describe(&self) -> String {
        describe_shape(&self.normalized_keys(), self.unique)
    }
}

/// Text keys have no inherent order in the engine's report; sort them by field
/// name after the non-text keys so shapes compare equal.
fn normalize_keys(keys: Vec<(String, IndexKind)>) -> Vec<(String, IndexKind)> {
    let (mut text, mut rest): (Vec<_>, Vec<_>) = keys
        .into_iter()
        .partition(|(_, kind)| *kind == IndexKind::Text);
    text.sort_by(|a, b| a.0.cmp(&b.0));
    rest.extend(text);
    rest
}

fn describe_shape(keys: &[(String, IndexKind)], unique: bool) -> String {
    let keys = keys
        .iter()
        .map(|(field, kind)| format!("{}: {}", field, kind.name_suffix()))
        .collect::<Vec<_>>()
        .join(", ");
    if unique {
        format!("{{{}}} unique", keys)
    } else {
        format!("{{{}}}", keys)
    }
}

/// Language the engine assigns to a text index when none is given
const DEFAULT_TEXT_LANGUAGE: &str = "english";

/// Field the engine reads a per-document language from by default
const DEFAULT_LANGUAGE_OVERRIDE: &str = "language";

/// An index as it exists in the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExistingIndex {
    pub name: String,
    pub keys: Vec<(String, IndexKind)>,
    pub unique: bool,
    /// Options that change which documents the index covers or how it
    /// behaves, e.g. `sparse` or `expireAfterSeconds=3600`. No declared
    /// index sets any of them.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl ExistingIndex {
    pub fn new(name: &str, keys: Vec<(String, IndexKind)>, unique: bool) -> Self {
        Self {
            name: name.to_string(),
            keys: normalize_keys(keys),
            unique,
            options: vec![],
        }
    }

    /// Attach behavior-changing options
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    /// The index the engine builds on `_id`
    pub fn id_index() -> Self {
        Self::new(
            ID_INDEX_NAME,
            vec![("_id".to_string(), IndexKind::Ascending)],
            false,
        )
    }

    /// The index a definition produces once created
    pub fn from_definition(definition: &IndexDefinition) -> Self {
        Self {
            name: definition.name(),
            keys: definition.normalized_keys(),
            unique: definition.unique,
            options: vec![],
        }
    }

    /// Read an index from a `listIndexes` entry
    ///
    /// Text indexes are reported with the synthetic keys `{_fts: "text", _ftsx: 1}`;
    /// their fields come from the `weights` document. Returns `None` for an
    /// entry without a name.
    pub fn from_model(model: &IndexModel) -> Option<Self> {
        let options = model.options.as_ref()?;
        let name = options.name.clone()?;

        let mut keys = Vec::new();
        for (field, value) in model.keys.iter() {
            match field.as_str() {
                "_fts" => {
                    if let Some(weights) = options.weights.as_ref() {
                        keys.extend(
                            weights
                                .keys()
                                .map(|field| (field.to_string(), IndexKind::Text)),
                        );
                    }
                }
                "_ftsx" => {}
                _ => keys.push((field.to_string(), IndexKind::from_bson(value))),
            }
        }

        Some(
            Self::new(&name, keys, options.unique.unwrap_or(false))
                .with_options(behavior_options(options)),
        )
    }

    /// Same keys, same uniqueness and no extra options
    pub fn matches(&self, definition: &IndexDefinition) -> bool {
        self.unique == definition.unique
            && self.options.is_empty()
            && self.same_keys(definition)
    }

    /// Same keys as the definition, ignoring options
    pub fn same_keys(&self, definition: &IndexDefinition) -> bool {
        self.keys == definition.normalized_keys()
    }

    pub fn is_text(&self) -> bool {
        self.keys.iter().any(|(_, kind)| *kind == IndexKind::Text)
    }

    pub fn describe(&self) -> String {
        let shape = describe_shape(&self.keys, self.unique);
        if self.options.is_empty() {
            shape
        } else {
            format!("{} {}", shape, self.options.join(" "))
        }
    }
}

/// Options of a listed index that a plain `createIndex` with only `name` and
/// `unique` would not produce.
fn behavior_options(options: &IndexOptions) -> Vec<String> {
    let mut found = Vec::new();

    if options.sparse == Some(true) {
        found.push("sparse".to_string());
    }
    if let Some(filter) = &options.partial_filter_expression {
        found.push(format!("partialFilterExpression={}", filter));
    }
    if let Some(expire) = options.expire_after {
        found.push(format!("expireAfterSeconds={}", expire.as_secs()));
    }
    if options.collation.is_some() {
        found.push("collation".to_string());
    }
    if options.hidden == Some(true) {
        found.push("hidden".to_string());
    }
    if let Some(weights) = &options.weights {
        let weighted: Vec<String> = weights
            .iter()
            .filter(|(_, weight)| !is_unit_weight(weight))
            .map(|(field, weight)| format!("{}:{}", field, weight))
            .collect();
        if !weighted.is_empty() {
            found.push(format!("weights={{{}}}", weighted.join(", ")));
        }
    }
    if let Some(language) = &options.default_language {
        if language != DEFAULT_TEXT_LANGUAGE {
            found.push(format!("default_language={}", language));
        }
    }
    if let Some(field) = &options.language_override {
        if field != DEFAULT_LANGUAGE_OVERRIDE {
            found.push(format!("language_override={}", field));
        }
    }

    found
}

fn is_unit_weight(weight: &Bson) -> bool {
    match weight {
        Bson::Int32(w) => *w == 1,
        Bson::Int64(w) => *w == 1,
        Bson::Double(w) => *w == 1.0,
        _ => false,
    }
}

/// State of one declared index against the indexes present on its collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    /// Present under its name in the declared shape
    Present,
    /// Not present and nothing in the way
    Missing,
    /// Present in a different shape, or blocked by another index
    Conflict(String),
}

/// Compare a declared index with the indexes present on its collection
pub fn index_state(definition: &IndexDefinition, existing: &[ExistingIndex]) -> IndexState {
    let name = definition.name();

    if let Some(found) = existing.iter().find(|index| index.name == name) {
        if found.matches(definition) {
            return IndexState::Present;
        }
        return IndexState::Conflict(format!(
            "existing index is {}, declared {}",
            found.describe(),
            definition.describe()
        ));
    }

    // the engine refuses a second index on the same keys and a second text index
    let blocking = existing.iter().find(|index| {
        index.same_keys(definition) || (index.is_text() && definition.is_text())
    });
    match blocking {
        Some(found) => IndexState::Conflict(format!(
            "index '{}' already exists as {}",
            found.name,
            found.describe()
        )),
        None => IndexState::Missing,
    }
}

/// Schema definitions for the film-assist database
pub struct SchemaDefinitions;

impl SchemaDefinitions {
    pub const USERS: &'static str = "users";
    pub const STORIES: &'static str = "stories";

    /// Collections in creation order
    pub const COLLECTIONS: &'static [&'static str] = &[Self::USERS, Self::STORIES];

    /// Indexes in creation order
    pub const INDEXES: &'static [IndexDefinition] = &[
        IndexDefinition {
            collection: Self::USERS,
            fields: &[(fields::EMAIL, IndexKind::Ascending)],
            unique: true,
        },
        IndexDefinition {
            collection: Self::USERS,
            fields: &[(fields::USERNAME, IndexKind::Ascending)],
            unique: true,
        },
        IndexDefinition {
            collection: Self::STORIES,
            fields: &[(fields::USER_ID, IndexKind::Ascending)],
            unique: false,
        },
        IndexDefinition {
            collection: Self::STORIES,
            fields: &[(fields::CREATED_AT, IndexKind::Descending)],
            unique: false,
        },
        IndexDefinition {
            collection: Self::STORIES,
            fields: &[
                (fields::TITLE, IndexKind::Text),
                (fields::THEME, IndexKind::Text),
            ],
            unique: false,
        },
    ];

    /// Declared indexes of one collection
    pub fn indexes_for(collection: &str) -> impl Iterator<Item = &'static IndexDefinition> + '_ {
        Self::INDEXES
            .iter()
            .filter(move |definition| definition.collection == collection)
    }
}

/// Kind of object an initialization step targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Collection,
    Index,
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Collection => write!(f, "collection"),
            StepKind::Index => write!(f, "index"),
        }
    }
}

/// What an initialization step did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    Created,
    Present,
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepAction::Created => write!(f, "created"),
            StepAction::Present => write!(f, "present"),
        }
    }
}

/// One completed initialization step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "display", derive(tabled::Tabled))]
pub struct InitStep {
    pub kind: StepKind,
    pub target: String,
    pub action: StepAction,
}

/// Result of a schema initialization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitReport {
    pub database: String,
    pub steps: Vec<InitStep>,
}

impl InitReport {
    /// Number of objects the run created
    pub fn created_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|step| step.action == StepAction::Created)
            .count()
    }

    /// Whether the database was already in the declared state
    pub fn is_noop(&self) -> bool {
        self.created_count() == 0
    }
}

/// Status of the database schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchemaStatus {
    /// Neither declared collection exists
    NotInitialized,

    /// All collections and indexes exist in the declared shape
    Current,

    /// Some declared objects are missing
    Incomplete {
        missing_collections: Vec<String>,
        missing_indexes: Vec<String>,
    },

    /// A declared index exists in a different shape
    Conflicting { conflicts: Vec<String> },
}

impl std::fmt::Display for SchemaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaStatus::NotInitialized => write!(f, "not initialized"),
            SchemaStatus::Current => write!(f, "current"),
            SchemaStatus::Incomplete { .. } => write!(f, "incomplete"),
            SchemaStatus::Conflicting { .. } => write!(f, "conflicting"),
        }
    }
}

/// Index inventory of one declared collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionSnapshot {
    pub name: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_count: Option<u64>,
    pub indexes: Vec<String>,
    /// Indexes present but not declared (excluding `_id_`)
    pub unexpected: Vec<String>,
}

/// Read-only view of the schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    pub database: String,
    pub status: SchemaStatus,
    pub collections: Vec<CollectionSnapshot>,
}

/// Schema manager for the film-assist database
///
/// Handles schema initialization and status inspection over any
/// [`SchemaBackend`]. Steps run strictly in order and each waits for the
/// engine's reply; the first failure aborts the rest.
pub struct SchemaManager<'a, B: SchemaBackend + ?Sized> {
    backend: &'a B,
}

impl<'a, B: SchemaBackend + ?Sized> SchemaManager<'a, B> {
    /// Create a new schema manager for the given backend
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Initialize the database schema
    ///
    /// Creates the collections and indexes that don't exist yet.
    pub async fn initialize(&self) -> Result<InitReport, SchemaError> {
        let database = self.backend.database_name().to_string();
        info!("Initializing schema of database '{}'", database);

        let mut steps = Vec::new();

        let existing = self.backend.collection_names().await?;
        for name in SchemaDefinitions::COLLECTIONS {
            let action = self.ensure_collection(name, &existing).await?;
            steps.push(InitStep {
                kind: StepKind::Collection,
                target: name.to_string(),
                action,
            });
        }

        for definition in SchemaDefinitions::INDEXES {
            let action = self.ensure_index(definition).await?;
            steps.push(InitStep {
                kind: StepKind::Index,
                target: definition.qualified_name(),
                action,
            });
        }

        Ok(InitReport { database, steps })
    }

    async fn ensure_collection(
        &self,
        name: &str,
        existing: &[String],
    ) -> Result<StepAction, SchemaError> {
        if existing.iter().any(|c| c == name) {
            debug!("Collection '{}' already exists", name);
            return Ok(StepAction::Present);
        }

        match self.backend.create_collection(name).await {
            Ok(()) => {
                info!("Created collection '{}'", name);
                Ok(StepAction::Created)
            }
            Err(SchemaError::CollectionExists { .. }) => {
                warn!("Collection '{}' was created concurrently", name);
                Ok(StepAction::Present)
            }
            Err(e) => Err(e),
        }
    }

    async fn ensure_index(&self, definition: &IndexDefinition) -> Result<StepAction, SchemaError> {
        let existing = self.backend.indexes(definition.collection).await?;

        match index_state(definition, &existing) {
            IndexState::Present => {
                debug!("Index '{}' already exists", definition.qualified_name());
                Ok(StepAction::Present)
            }
            IndexState::Conflict(detail) => Err(SchemaError::DuplicateIndexConflict {
                collection: definition.collection.to_string(),
                index: definition.name(),
                detail,
            }),
            IndexState::Missing => {
                let name = self.backend.create_index(definition).await?;
                info!(
                    "Created index '{}' on '{}' {}",
                    name,
                    definition.collection,
                    definition.describe()
                );
                Ok(StepAction::Created)
            }
        }
    }

    /// Check the current schema status
    pub async fn check_status(&self) -> Result<SchemaStatus, SchemaError> {
        let collections = self.backend.collection_names().await?;
        let indexes = self.collect_indexes(&collections).await?;
        Ok(classify_status(&collections, &indexes))
    }

    /// Inspect the declared collections and their indexes
    pub async fn inspect(&self) -> Result<SchemaSnapshot, SchemaError> {
        let collections = self.backend.collection_names().await?;
        let indexes = self.collect_indexes(&collections).await?;
        let status = classify_status(&collections, &indexes);

        let mut snapshots = Vec::new();
        for name in SchemaDefinitions::COLLECTIONS {
            let exists = collections.iter().any(|c| c == name);
            let present = indexes.get(*name).cloned().unwrap_or_default();
            let declared: Vec<String> = SchemaDefinitions::indexes_for(name)
                .map(|definition| definition.name())
                .collect();

            let document_count = if exists {
                Some(self.backend.document_count(name).await?)
            } else {
                None
            };

            snapshots.push(CollectionSnapshot {
                name: name.to_string(),
                exists,
                document_count,
                indexes: present.iter().map(|index| index.name.clone()).collect(),
                unexpected: present
                    .iter()
                    .filter(|index| index.name != ID_INDEX_NAME && !declared.contains(&index.name))
                    .map(|index| index.name.clone())
                    .collect(),
            });
        }

        Ok(SchemaSnapshot {
            database: self.backend.database_name().to_string(),
            status,
            collections: snapshots,
        })
    }

    async fn collect_indexes(
        &self,
        collections: &[String],
    ) -> Result<BTreeMap<String, Vec<ExistingIndex>>, SchemaError> {
        let mut indexes = BTreeMap::new();
        for name in SchemaDefinitions::COLLECTIONS {
            if collections.iter().any(|c| c == name) {
                indexes.insert(name.to_string(), self.backend.indexes(name).await?);
            }
        }
        Ok(indexes)
    }
}

fn classify_status(
    collections: &[String],
    indexes: &BTreeMap<String, Vec<ExistingIndex>>,
) -> SchemaStatus {
    let missing_collections: Vec<String> = SchemaDefinitions::COLLECTIONS
        .iter()
        .filter(|name| !collections.iter().any(|c| c == *name))
        .map(|name| name.to_string())
        .collect();

    if missing_collections.len() == SchemaDefinitions::COLLECTIONS.len() {
        return SchemaStatus::NotInitialized;
    }

    let mut missing_indexes = Vec::new();
    let mut conflicts = Vec::new();
    for definition in SchemaDefinitions::INDEXES {
        let present = indexes
            .get(definition.collection)
            .map(|v| v.as_slice())
            .unwrap_or_default();
        match index_state(definition, present) {
            IndexState::Present => {}
            IndexState::Missing => missing_indexes.push(definition.qualified_name()),
            IndexState::Conflict(detail) => {
                conflicts.push(format!("{}: {}", definition.qualified_name(), detail))
            }
        }
    }

    if !conflicts.is_empty() {
        SchemaStatus::Conflicting { conflicts }
    } else if missing_collections.is_empty() && missing_indexes.is_empty() {
        SchemaStatus::Current
    } else {
        SchemaStatus::Incomplete {
            missing_collections,
            missing_indexes,
        }
    }
}
