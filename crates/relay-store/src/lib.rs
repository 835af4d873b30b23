//! Persistence layer for the message relay.
//!
//! This crate stores tenants (one row per communication group plus a reserved
//! sentinel row for the service) and relay tasks (directed, language-tagged
//! edges between origins and destinations). It runs against SQLite or
//! PostgreSQL through one operation set, keeps the servers table additively
//! migrated, and answers fleet-wide and per-tenant statistics.
//!
//! # Example
//!
//! ```no_run
//! use relay_store::{relay, stats, Database, OriginId};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect, create/patch tables and seed known groups
//!     let db = Database::connect("sqlite:relay.db?mode=rwc").await?;
//!     db.initialize(&["g1", "g2"]).await?;
//!
//!     // Relay g1 into g2, translating English to French
//!     let origin = OriginId::group("g1");
//!     relay::upsert_task(&db, &origin, &["g2"], "g1", "g1", "en", "fr").await;
//!
//!     let fleet = stats::fleet_stats(&db).await?;
//!     println!("{} active relays", fleet.active_tasks);
//!
//!     db.close().await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod migration;
pub mod models;
pub mod notify;
pub mod relay;
pub mod schema;
pub mod stats;
pub mod tenant;

pub use backend::Backend;
pub use config::{BackendKind, ConfigError, StoreConfig};
pub use error::{DatabaseError, Result};
pub use models::{
    FleetStats, InitReport, OriginId, Server, Task, TenantStats, Toggle, UpsertReport,
};
pub use notify::{Notifier, NotifyLevel, TracingNotifier};

use std::fmt;
use std::sync::Arc;

/// Database connection wrapper.
///
/// Cheap to clone; clones share the pool and the notifier.
#[derive(Clone)]
pub struct Database {
    backend: Backend,
    notifier: Arc<dyn Notifier>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Connect using default pool settings.
    ///
    /// The URL selects the engine:
    ///
    /// ```no_run
    /// # async fn example() -> relay_store::Result<()> {
    /// // File database
    /// let db = relay_store::Database::connect("data/relay.db").await?;
    ///
    /// // In-memory database (for testing)
    /// let db = relay_store::Database::connect("sqlite::memory:").await?;
    ///
    /// // PostgreSQL
    /// let db = relay_store::Database::connect("postgres://relay@localhost/relay").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(&StoreConfig::new(url)).await
    }

    /// Connect with explicit pool settings, reporting through `tracing`.
    pub async fn connect_with(config: &StoreConfig) -> Result<Self> {
        Self::connect_with_notifier(config, Arc::new(TracingNotifier)).await
    }

    /// Connect with explicit pool settings and a custom event sink.
    pub async fn connect_with_notifier(
        config: &StoreConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let backend = Backend::connect(config).await?;

        tracing::info!(
            backend = ?backend.kind(),
            pool_size = config.max_connections,
            "Connected to database"
        );
        notifier.notify(NotifyLevel::Dev, "Successfully connected to database");

        Ok(Self { backend, notifier })
    }

    /// Bring the schema up to date and seed tenants.
    ///
    /// Creates missing tables and indexes, adds any missing server columns,
    /// drops the legacy task index, ensures the sentinel row exists and
    /// creates a tenant row for every group in `known_group_ids` that has
    /// none. Safe to run on every startup.
    pub async fn initialize<S: AsRef<str>>(&self, known_group_ids: &[S]) -> Result<InitReport> {
        tracing::info!(groups = known_group_ids.len(), "Initializing database...");

        migration::create_tables(self).await?;
        let columns_added = migration::reconcile_schema(self).await?;
        migration::drop_legacy_index(self).await?;
        let tenants_created = tenant::ensure_seeded(self, known_group_ids).await?;

        self.notify(NotifyLevel::Info, "Database fully initialized.");
        tracing::info!(
            columns_added = columns_added.len(),
            tenants_created,
            "Initialization complete"
        );

        Ok(InitReport {
            columns_added: columns_added.into_iter().map(String::from).collect(),
            tenants_created,
        })
    }

    /// Get a reference to the engine pool.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Report an operational event to the configured sink.
    pub fn notify(&self, level: NotifyLevel, message: &str) {
        self.notifier.notify(level, message);
    }

    /// Close the database connection pool.
    ///
    /// Callers must let in-flight operations finish first.
    pub async fn close(&self) {
        self.backend.close().await;
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SENTINEL_ID;
    use crate::testing::recorded_db;

    #[tokio::test]
    async fn test_initialize_seeds_sentinel_and_groups() {
        let (db, notifier) = recorded_db().await;

        let report = db.initialize(&["g1", "g2"]).await.unwrap();
        assert!(report.columns_added.is_empty());
        assert_eq!(report.tenants_created, 2);

        let sentinel = tenant::get_tenant(&db, SENTINEL_ID).await.unwrap().unwrap();
        assert!(sentinel.is_sentinel());
        assert_eq!(sentinel.lang, "en");

        assert_eq!(tenant::count_all(&db).await.unwrap(), 3);
        assert!(notifier
            .events()
            .iter()
            .any(|(level, msg)| *level == NotifyLevel::Info && msg.contains("fully initialized")));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let (db, _) = recorded_db().await;
        db.initialize(&["g1"]).await.unwrap();

        let again = db.initialize(&["g1"]).await.unwrap();
        assert_eq!(again, InitReport::default());
        assert_eq!(tenant::count_all(&db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_connect_reports_success() {
        let (_db, notifier) = recorded_db().await;
        assert_eq!(
            notifier.events()[0],
            (NotifyLevel::Dev, "Successfully connected to database".to_string())
        );
    }
}
