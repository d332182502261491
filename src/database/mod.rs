//! Database module
//!
//! This module provides all database functionality for filmdb, organized into:
//!
//! - **core**: Core database infrastructure (MongoDB connection, schema management)
//! - **records**: Typed records of the `users` and `stories` collections
//! - **verify**: Read-only probes of a live database
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/           # Foundation
//! │   ├── connection  # MongoDB DatabaseConn wrapper
//! │   ├── backend     # SchemaBackend trait
//! │   ├── memory      # In-memory engine model
//! │   ├── schema      # Schema definitions and management
//! │   └── error       # SchemaError taxonomy
//! │
//! ├── records         # UserRecord, StoryRecord, Scene
//! └── verify          # Query-plan probes
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use filmdb::database::{DatabaseConn, SchemaManager};
//!
//! let conn = DatabaseConn::open(&config).await?;
//! let report = SchemaManager::new(&conn).initialize().await?;
//! println!("{} objects created", report.created_count());
//! ```

pub mod core;
pub mod records;
pub mod verify;

pub use core::{
    codes, index_state, CollectionSnapshot, DatabaseConn, ExistingIndex, IndexDefinition,
    IndexKind, IndexState, InitReport, InitStep, MemoryBackend, SchemaBackend, SchemaDefinitions,
    SchemaError, SchemaManager, SchemaSnapshot, SchemaStatus, StepAction, StepKind,
    DEFAULT_DATABASE, ID_INDEX_NAME,
};

pub use records::{Scene, StoryRecord, StoryStatus, SubscriptionTier, UserRecord};

pub use verify::{ProbeResult, QueryPlan, SchemaVerifier, VerifyReport};
