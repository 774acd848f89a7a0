//! SQLite backend for the Strata migration engine.
//!
//! This crate implements the engine's [`Connection`](strata_migrate::Connection)
//! contract on top of `tokio-rusqlite`.
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_migrate::{Configuration, MigrationEngine};
//! use strata_sqlite::SqliteConnectionFactory;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let factory = SqliteConnectionFactory::shared("sqlite://./app.db")?;
//!     let config = Configuration::new().locations(["db/migration"]);
//!
//!     let engine = MigrationEngine::builder(config, factory).build()?;
//!     engine.migrate().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;

pub use config::{DatabasePath, JournalMode, SqliteConfig, SynchronousMode};
pub use connection::{PRODUCT_NAME, SqliteConnection, SqliteConnectionFactory};
pub use error::{SqliteError, SqliteResult};
