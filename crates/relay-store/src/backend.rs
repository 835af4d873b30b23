//! Engine abstraction over SQLite and PostgreSQL.
//!
//! Statements are built once with sea-query and rendered with the query
//! builder that matches the connected engine, so every repository runs the
//! same operation set against either store.

use std::str::FromStr;

use sea_query::{PostgresQueryBuilder, SchemaStatementBuilder, SelectStatement, SqliteQueryBuilder};
use sea_query_binder::{SqlxBinder, SqlxValues};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::FromRow;

use crate::config::{BackendKind, StoreConfig};
use crate::error::{DatabaseError, Result};

/// A connection pool to one of the supported engines.
#[derive(Debug, Clone)]
pub enum Backend {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

impl Backend {
    /// Open a pool for the engine selected by `config.database_url`.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let url = config.database_url.as_str();
        match BackendKind::from_url(url) {
            Some(BackendKind::Sqlite) => {
                let url = if url.starts_with("sqlite:") {
                    url.to_string()
                } else {
                    format!("sqlite:{url}")
                };
                let mut options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
                if !url.contains(":memory:") {
                    options = options.journal_mode(SqliteJournalMode::Wal);
                }

                let pool = SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(config.acquire_timeout)
                    .connect_with(options)
                    .await?;
                Ok(Backend::Sqlite(pool))
            }
            Some(BackendKind::Postgres) => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(config.acquire_timeout)
                    .connect(url)
                    .await?;
                Ok(Backend::Postgres(pool))
            }
            None => Err(DatabaseError::UnsupportedUrl(url.to_string())),
        }
    }

    /// Which engine this pool talks to.
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Sqlite(_) => BackendKind::Sqlite,
            Backend::Postgres(_) => BackendKind::Postgres,
        }
    }

    fn build<S: SqlxBinder>(&self, stmt: &S) -> (String, SqlxValues) {
        match self {
            Backend::Sqlite(_) => stmt.build_sqlx(SqliteQueryBuilder),
            Backend::Postgres(_) => stmt.build_sqlx(PostgresQueryBuilder),
        }
    }

    /// Run an INSERT/UPDATE/DELETE and return the affected row count.
    pub async fn execute<S: SqlxBinder>(&self, stmt: &S) -> std::result::Result<u64, sqlx::Error> {
        let (sql, values) = self.build(stmt);
        let affected = match self {
            Backend::Sqlite(pool) => sqlx::query_with(&sql, values).execute(pool).await?.rows_affected(),
            Backend::Postgres(pool) => sqlx::query_with(&sql, values).execute(pool).await?.rows_affected(),
        };
        Ok(affected)
    }

    /// Run a SELECT and decode every row.
    ///
    /// Row reads are not cached as prepared statements: a cached statement
    /// keeps the column set it saw when first prepared, which goes stale once
    /// reconciliation adds server columns on a live connection.
    pub async fn fetch_all<T>(&self, stmt: &SelectStatement) -> std::result::Result<Vec<T>, sqlx::Error>
    where
        T: for<'r> FromRow<'r, SqliteRow> + for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let (sql, values) = self.build(stmt);
        match self {
            Backend::Sqlite(pool) => sqlx::query_as_with::<_, T, _>(&sql, values).persistent(false).fetch_all(pool).await,
            Backend::Postgres(pool) => sqlx::query_as_with::<_, T, _>(&sql, values).persistent(false).fetch_all(pool).await,
        }
    }

    /// Run a SELECT and decode at most one row.
    pub async fn fetch_optional<T>(&self, stmt: &SelectStatement) -> std::result::Result<Option<T>, sqlx::Error>
    where
        T: for<'r> FromRow<'r, SqliteRow> + for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let (sql, values) = self.build(stmt);
        match self {
            Backend::Sqlite(pool) => sqlx::query_as_with::<_, T, _>(&sql, values).persistent(false).fetch_optional(pool).await,
            Backend::Postgres(pool) => sqlx::query_as_with::<_, T, _>(&sql, values).persistent(false).fetch_optional(pool).await,
        }
    }

    /// Run a SELECT that yields a single integer.
    pub async fn fetch_count(&self, stmt: &SelectStatement) -> std::result::Result<i64, sqlx::Error> {
        let (sql, values) = self.build(stmt);
        match self {
            Backend::Sqlite(pool) => sqlx::query_scalar_with::<_, i64, _>(&sql, values).fetch_one(pool).await,
            Backend::Postgres(pool) => sqlx::query_scalar_with::<_, i64, _>(&sql, values).fetch_one(pool).await,
        }
    }

    /// Run a DDL statement.
    pub async fn execute_schema<S: SchemaStatementBuilder>(&self, stmt: &S) -> std::result::Result<(), sqlx::Error> {
        match self {
            Backend::Sqlite(pool) => {
                sqlx::query(&stmt.build(SqliteQueryBuilder)).execute(pool).await?;
            }
            Backend::Postgres(pool) => {
                sqlx::query(&stmt.build(PostgresQueryBuilder)).execute(pool).await?;
            }
        }
        Ok(())
    }

    /// Run a fixed SQL string that is valid on both engines.
    pub async fn execute_raw(&self, sql: &str) -> std::result::Result<(), sqlx::Error> {
        match self {
            Backend::Sqlite(pool) => {
                sqlx::query(sql).execute(pool).await?;
            }
            Backend::Postgres(pool) => {
                sqlx::query(sql).execute(pool).await?;
            }
        }
        Ok(())
    }

    /// Column names currently present on `table`.
    pub async fn live_columns(&self, table: &str) -> std::result::Result<Vec<String>, sqlx::Error> {
        match self {
            Backend::Sqlite(pool) => {
                sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info(?)")
                    .bind(table)
                    .fetch_all(pool)
                    .await
            }
            Backend::Postgres(pool) => {
                sqlx::query_scalar::<_, String>(
                    r#"
                    SELECT column_name::text
                    FROM information_schema.columns
                    WHERE table_schema = current_schema() AND table_name = $1
                    ORDER BY ordinal_position
                    "#,
                )
                .bind(table)
                .fetch_all(pool)
                .await
            }
        }
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        match self {
            Backend::Sqlite(pool) => pool.close().await,
            Backend::Postgres(pool) => pool.close().await,
        }
    }
}
