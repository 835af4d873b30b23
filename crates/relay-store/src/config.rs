//! Connection configuration loaded from code or environment variables.

use std::env;
use std::time::Duration;

/// Which storage engine a connection string selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Lightweight file-backed (or in-memory) SQLite.
    Sqlite,
    /// Full relational PostgreSQL.
    Postgres,
}

impl BackendKind {
    /// Pick the engine from a connection string.
    ///
    /// `sqlite:` URLs, `:memory:` and plain paths ending in `.db` select SQLite;
    /// `postgres://` and `postgresql://` select PostgreSQL.
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("sqlite:") || url == ":memory:" || url.ends_with(".db") {
            Some(BackendKind::Sqlite)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(BackendKind::Postgres)
        } else {
            None
        }
    }
}

/// Store connection configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Connection string; selects the engine.
    pub database_url: String,
    /// Maximum pool size.
    pub max_connections: u32,
    /// How long to wait for a pooled connection.
    pub acquire_timeout: Duration,
}

impl StoreConfig {
    /// Default pool size for database connections.
    /// Set high enough to handle concurrent relay fan-out.
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 20;

    /// Default acquire timeout in seconds.
    pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

    /// Create a configuration with default pool settings.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(Self::DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }

    /// Override the pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Override the acquire timeout.
    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `DATABASE_URL` | Connection string | (required) |
    /// | `DATABASE_MAX_CONNECTIONS` | Pool size | `20` |
    /// | `DATABASE_ACQUIRE_TIMEOUT_SECS` | Acquire timeout | `30` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let max_connections = parse_var(
            "DATABASE_MAX_CONNECTIONS",
            Self::DEFAULT_MAX_CONNECTIONS,
        )?;

        let acquire_timeout_secs = parse_var(
            "DATABASE_ACQUIRE_TIMEOUT_SECS",
            Self::DEFAULT_ACQUIRE_TIMEOUT_SECS,
        )?;

        Ok(Self {
            database_url,
            max_connections,
            acquire_timeout: Duration::from_secs(acquire_timeout_secs),
        })
    }

    /// The engine selected by `database_url`, if any.
    pub fn backend_kind(&self) -> Option<BackendKind> {
        BackendKind::from_url(&self.database_url)
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var }),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("{var} must be a positive integer")]
    InvalidNumber { var: &'static str },
}
