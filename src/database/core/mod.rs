//! Core database infrastructure
//!
//! This module provides the foundational database components used throughout filmdb:
//! - `DatabaseConn`: MongoDB connection wrapper selecting the target database
//! - `SchemaBackend`: the engine operations schema management needs
//! - `MemoryBackend`: in-memory engine model for dry runs and tests
//! - `SchemaManager`: Schema initialization and status inspection
//! - `SchemaError`: error taxonomy for schema operations

mod backend;
mod connection;
mod error;
mod memory;
mod schema;

pub use backend::SchemaBackend;
pub use connection::DatabaseConn;
pub use error::{codes, SchemaError};
pub use memory::MemoryBackend;
pub use schema::{
    index_state, CollectionSnapshot, ExistingIndex, IndexDefinition, IndexKind, IndexState,
    InitReport, InitStep, SchemaDefinitions, SchemaManager, SchemaSnapshot, SchemaStatus,
    StepAction, StepKind, DEFAULT_DATABASE, ID_INDEX_NAME,
};
