#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! filmdb - schema bootstrap for the film-assist story database
//!
//! filmdb selects a MongoDB database, ensures the `users` and `stories`
//! collections exist, and ensures the indexes the story application relies on:
//!
//! | Collection | Fields | Properties |
//! |------------|--------|------------|
//! | `users` | `email` ascending | unique |
//! | `users` | `username` ascending | unique |
//! | `stories` | `user_id` ascending | |
//! | `stories` | `created_at` descending | |
//! | `stories` | `title`, `theme` | text |
//!
//! Initialization is idempotent: objects already present in the declared
//! shape are left alone, and an index that exists in a different shape is
//! reported as a conflict and never altered. It can be used as both a
//! command-line application and a library.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | `display` | Table formatting with `tabled` | `tabled` |
//! | `cli` | CLI binary | `clap`, `tracing-subscriber` |
//!
//! # Architecture
//!
//! - **[`database`]**: connection, schema definitions and management,
//!   in-memory engine model, verification probes, record types
//! - **[`config`]**: Configuration management
//! - **[`output`]**: Output formats shared by the commands
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use filmdb::{DatabaseConn, FilmdbConfig, SchemaManager};
//!
//! let config = FilmdbConfig::new(&None)?;
//! let conn = DatabaseConn::open(&config).await?;
//!
//! let report = SchemaManager::new(&conn).initialize().await?;
//! println!("Database initialized successfully");
//! ```
//!
//! ## Dry run
//!
//! ```rust,ignore
//! use filmdb::{MemoryBackend, SchemaManager};
//!
//! let copy = MemoryBackend::snapshot_of(&conn).await?;
//! let report = SchemaManager::new(&copy).initialize().await?;
//! for step in report.steps {
//!     println!("{} {} would be {}", step.kind, step.target, step.action);
//! }
//! ```

pub mod config;
pub mod database;
pub mod output;

pub use config::FilmdbConfig;

pub use database::{
    DatabaseConn, ExistingIndex, IndexDefinition, IndexKind, InitReport, InitStep, MemoryBackend,
    SchemaBackend, SchemaDefinitions, SchemaError, SchemaManager, SchemaSnapshot, SchemaStatus,
    StepAction, StepKind, DEFAULT_DATABASE,
};

pub use database::{ProbeResult, QueryPlan, SchemaVerifier, VerifyReport};

pub use database::{Scene, StoryRecord, StoryStatus, SubscriptionTier, UserRecord};

pub use output::OutputFormat;
