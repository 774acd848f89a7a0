//! # strata-migrate
//!
//! Migration engine for Strata.
//!
//! This crate provides:
//! - Resolution of versioned, baseline and repeatable migrations from SQL
//!   scripts and Rust code
//! - A schema history table recording every applied migration
//! - State reconciliation between resolved and applied migrations
//! - The `migrate`, `validate`, `baseline`, `repair` and `info` commands
//! - Lifecycle callbacks around every command and migration
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────────┐
//! │ Resolvers    │────▶│ Info Service   │◀────│ Schema History   │
//! │ (SQL, code)  │     │ (states)       │     │ (history table)  │
//! └──────────────┘     └────────────────┘     └──────────────────┘
//!                              │                       ▲
//!                              ▼                       │
//!                      ┌────────────────┐              │
//!                      │ Commands       │──────────────┘
//!                      │ migrate, ...   │
//!                      └────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata_migrate::{Configuration, MigrationEngine};
//!
//! async fn run(factory: Arc<dyn strata_migrate::ConnectionFactory>) -> strata_migrate::StrataResult<()> {
//!     let config = Configuration::new()
//!         .locations(["db/migration"])
//!         .baseline_on_migrate(true);
//!
//!     let engine = MigrationEngine::builder(config, factory).build()?;
//!     let result = engine.migrate().await?;
//!     println!(
//!         "Migrated from {:?} to {:?}",
//!         result.initial_schema_version, result.target_schema_version
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Migration Files
//!
//! ```text
//! db/migration/
//! ├── V1__Create_users.sql
//! ├── V1_1__Add_email.sql
//! ├── B2__Snapshot.sql
//! ├── R__User_views.sql
//! └── afterMigrate.sql        (callback)
//! ```

pub mod callback;
pub mod checksum;
pub mod commands;
pub mod config;
pub mod connection;
pub mod context;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod history;
pub mod info;
pub mod logging;
pub mod migration;
pub mod navigable;
pub mod resolver;
pub mod results;
pub mod state;
pub mod validation;
pub mod version;

pub use callback::{Callback, CallbackContext, CallbackExecutor, Event, SqlCallback};
pub use checksum::Checksum;
pub use config::Configuration;
pub use connection::{Connection, ConnectionFactory, Row, SqlValue, in_transaction};
pub use context::OperationContext;
pub use dialect::{
    CockroachDialect, Dialect, DialectRegistry, HistoryTable, PostgresDialect, SqliteDialect,
};
pub use engine::{MigrationEngine, MigrationEngineBuilder};
pub use error::{ErrorCode, ErrorDetails, MigrationError, StrataResult};
pub use history::{BaselineMarker, RetryPolicy, SchemaHistory, TableSchemaHistory};
pub use info::{InfoSettings, MigrationInfo, MigrationInfoService};
pub use migration::{
    AppliedMigration, MigrationExecutor, MigrationType, NewAppliedMigration, ResolvedMigration,
};
pub use navigable::NavigableMigrations;
pub use resolver::{
    CodeMigration, CodeMigrationProvider, CompositeMigrationResolver, FileSystemResourceProvider,
    MigrationResolver, ResourceProvider, SqlMigrationResolver, StaticCodeMigrationProvider,
    StaticResourceProvider,
};
pub use results::{
    BaselineResult, InfoResult, MigrateResult, OperationResult, RepairResult, ValidateResult,
};
pub use state::MigrationState;
pub use validation::{InvalidMigration, MigrationPattern, ValidatePattern, ValidationContext};
pub use version::{MigrationVersion, TargetVersion};
