//! # Strata
//!
//! Versioned and repeatable database schema migrations with an auditable
//! history table.
//!
//! Strata provides:
//! - Versioned (`V1__init.sql`), baseline (`B5__snapshot.sql`) and
//!   repeatable (`R__views.sql`) migrations, in SQL or Rust
//! - A schema history table recording every applied migration
//! - `migrate`, `validate`, `baseline`, `repair` and `info` commands
//! - SQL and Rust callbacks around every command and migration
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use strata::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), strata::MigrationError> {
//!     let config = Configuration::from_file("strata.toml")?;
//!     let engine = strata::sqlite_engine(config)?;
//!
//!     let result = engine.migrate().await?;
//!     println!(
//!         "Schema now at {:?} ({} migration(s) applied)",
//!         result.target_schema_version, result.migrations_executed
//!     );
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The migration engine.
pub mod migrate {
    pub use strata_migrate::*;
}

/// SQLite backend.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub mod sqlite {
    pub use strata_sqlite::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use strata_migrate::{
        Callback, CallbackContext, CodeMigration, Configuration, Connection, ConnectionFactory,
        Event, MigrationEngine, MigrationError, MigrationState, StrataResult, TargetVersion,
        ValidatePattern,
    };

    #[cfg(feature = "sqlite")]
    pub use strata_sqlite::SqliteConnectionFactory;
}

// Re-export key types at the crate root
pub use strata_migrate::{
    Configuration, MigrationEngine, MigrationEngineBuilder, MigrationError, StrataResult, logging,
};

/// Build an engine for the SQLite database named by `configuration.url`.
#[cfg(feature = "sqlite")]
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
pub fn sqlite_engine(configuration: Configuration) -> StrataResult<MigrationEngine> {
    let url = configuration
        .url
        .clone()
        .ok_or_else(|| MigrationError::configuration("url is required"))?;
    let factory = strata_sqlite::SqliteConnectionFactory::shared(url)?;
    MigrationEngine::builder(configuration, factory).build()
}
