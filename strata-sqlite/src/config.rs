//! SQLite connection settings.

use std::path::{Path, PathBuf};

use crate::error::{SqliteError, SqliteResult};

/// Where the database lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DatabasePath {
    /// In-memory database, shared by every connection of one factory.
    #[default]
    Memory,
    /// File-based database.
    File(PathBuf),
}

impl DatabasePath {
    /// Check if this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }
}

/// SQLite synchronous mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SynchronousMode {
    Off,
    #[default]
    Normal,
    Full,
    Extra,
}

impl SynchronousMode {
    /// Get the SQLite pragma value.
    pub fn as_pragma(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
            Self::Extra => "EXTRA",
        }
    }

    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "off" => Self::Off,
            "full" => Self::Full,
            "extra" => Self::Extra,
            _ => Self::Normal,
        }
    }
}

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum JournalMode {
    /// Deletes the journal after each transaction.
    #[default]
    Delete,
    Truncate,
    Persist,
    Memory,
    /// Write-ahead logging.
    Wal,
}

impl JournalMode {
    /// Get the SQLite pragma value.
    pub fn as_pragma(&self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Persist => "PERSIST",
            Self::Memory => "MEMORY",
            Self::Wal => "WAL",
        }
    }

    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "truncate" => Self::Truncate,
            "persist" => Self::Persist,
            "memory" => Self::Memory,
            "wal" => Self::Wal,
            _ => Self::Delete,
        }
    }
}

/// SQLite database configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteConfig {
    /// Database location.
    pub path: DatabasePath,
    /// Enable foreign keys.
    pub foreign_keys: bool,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: Option<u32>,
    /// Synchronous mode.
    pub synchronous: SynchronousMode,
    /// Journal mode.
    pub journal_mode: JournalMode,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: DatabasePath::Memory,
            foreign_keys: true,
            busy_timeout_ms: Some(5000),
            synchronous: SynchronousMode::Normal,
            journal_mode: JournalMode::Delete,
        }
    }
}

impl SqliteConfig {
    /// Configuration for an in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Configuration for a file-based database.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            path: DatabasePath::File(path.as_ref().to_path_buf()),
            ..Default::default()
        }
    }

    /// Parse a SQLite URL.
    ///
    /// Supported formats:
    /// - `sqlite::memory:` or `:memory:` - in-memory database
    /// - `sqlite://path/to/db.sqlite` - relative path
    /// - `sqlite:///absolute/path/db.sqlite` - absolute path
    /// - `sqlite:path/to/db.sqlite` or `file:path/to/db.sqlite`
    ///
    /// Query parameters: `foreign_keys`, `busy_timeout`, `synchronous`,
    /// `journal_mode` and `mode=memory`.
    pub fn from_url(url: impl AsRef<str>) -> SqliteResult<Self> {
        let url = url.as_ref();
        let (location, query) = match url.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (url, None),
        };

        let path = if let Some(rest) = location.strip_prefix("sqlite://") {
            if rest.is_empty() {
                return Err(SqliteError::config("database path is required"));
            }
            Some(rest)
        } else if let Some(rest) = location
            .strip_prefix("sqlite:")
            .or_else(|| location.strip_prefix("file:"))
        {
            if rest.is_empty() {
                return Err(SqliteError::config("database path is required"));
            }
            (rest != ":memory:").then_some(rest)
        } else if location == ":memory:" {
            None
        } else {
            return Err(SqliteError::config(format!(
                "unsupported SQLite URL '{}'",
                url
            )));
        };

        let mut config = match path {
            Some(path) => Self::file(path),
            None => Self::memory(),
        };

        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            match key {
                "mode" if value == "memory" => config.path = DatabasePath::Memory,
                "foreign_keys" => config.foreign_keys = value == "true" || value == "1",
                "busy_timeout" => {
                    let ms = value.parse().map_err(|_| {
                        SqliteError::config(format!("invalid busy_timeout '{}'", value))
                    })?;
                    config.busy_timeout_ms = Some(ms);
                }
                "synchronous" => config.synchronous = SynchronousMode::parse(value),
                "journal_mode" => config.journal_mode = JournalMode::parse(value),
                _ => {}
            }
        }

        Ok(config)
    }

    /// Pragmas run on every new connection.
    pub fn init_sql(&self) -> String {
        let mut sql = String::new();
        // First, so the pragmas below wait for a concurrent writer.
        if let Some(timeout) = self.busy_timeout_ms {
            sql.push_str(&format!("PRAGMA busy_timeout = {};\n", timeout));
        }
        if self.foreign_keys {
            sql.push_str("PRAGMA foreign_keys = ON;\n");
        }
        if !self.path.is_memory() {
            sql.push_str(&format!(
                "PRAGMA journal_mode = {};\n",
                self.journal_mode.as_pragma()
            ));
        }
        sql.push_str(&format!(
            "PRAGMA synchronous = {};\n",
            self.synchronous.as_pragma()
        ));
        sql
    }

    /// Enable or disable foreign keys.
    pub fn foreign_keys(mut self, enabled: bool) -> Self {
        self.foreign_keys = enabled;
        self
    }

    /// Set the busy timeout in milliseconds.
    pub fn busy_timeout(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = Some(ms);
        self
    }

    /// Set the synchronous mode.
    pub fn synchronous(mut self, mode: SynchronousMode) -> Self {
        self.synchronous = mode;
        self
    }

    /// Set the journal mode.
    pub fn journal_mode(mut self, mode: JournalMode) -> Self {
        self.journal_mode = mode;
        self
    }
}
