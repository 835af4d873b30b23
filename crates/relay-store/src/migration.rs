//! Table creation and additive schema reconciliation.
//!
//! Older deployments created the servers table before the style and webhook
//! columns existed. [`reconcile_schema`] inspects the live table and appends
//! whatever the declared shape has that the table lacks. It never drops,
//! renames or rewrites columns, so it is safe to run alongside live traffic
//! and on every startup.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::error::{DatabaseError, Result};
use crate::notify::NotifyLevel;
use crate::schema::{self, LEGACY_TASK_INDEX};
use crate::Database;

const SERVERS: &str = "servers";
const TASKS: &str = "tasks";

/// Create both tables and the task identity index if they are absent.
pub async fn create_tables(db: &Database) -> Result<()> {
    let backend = db.backend();

    backend
        .execute_schema(&schema::create_servers_table())
        .await
        .map_err(|e| DatabaseError::schema(SERVERS, e))?;
    backend
        .execute_schema(&schema::create_tasks_table())
        .await
        .map_err(|e| DatabaseError::schema(TASKS, e))?;
    backend
        .execute_schema(&schema::create_task_identity_index())
        .await
        .map_err(|e| DatabaseError::schema(TASKS, e))?;

    debug!("Tables present");
    Ok(())
}

/// Drop the non-unique index older deployments created on tasks.
pub async fn drop_legacy_index(db: &Database) -> Result<()> {
    db.backend()
        .execute_raw(&format!("DROP INDEX IF EXISTS {}", LEGACY_TASK_INDEX))
        .await
        .map_err(|e| DatabaseError::schema(TASKS, e))
}

async fn live_server_columns(db: &Database) -> Result<HashSet<String>> {
    let columns = db
        .backend()
        .live_columns(SERVERS)
        .await
        .map_err(|e| DatabaseError::schema(SERVERS, e))?;
    Ok(columns.into_iter().collect())
}

/// Add every declared server column the live table is missing.
///
/// Returns the names of the columns added; an up-to-date table yields an
/// empty list. A missing table is created outright.
pub async fn reconcile_schema(db: &Database) -> Result<Vec<&'static str>> {
    let mut live = live_server_columns(db).await?;
    if live.is_empty() {
        warn!("servers table missing; creating it");
        db.backend()
            .execute_schema(&schema::create_servers_table())
            .await
            .map_err(|e| DatabaseError::schema(SERVERS, e))?;
        live = live_server_columns(db).await?;
    }

    let mut added = Vec::new();
    // A primary key cannot be appended; it exists whenever the table does.
    for spec in schema::declared_server_columns()
        .iter()
        .filter(|spec| !spec.primary_key)
    {
        if live.contains(spec.name) {
            continue;
        }

        info!(column = spec.name, "Adding missing column to servers");
        match db
            .backend()
            .execute_schema(&schema::add_server_column(spec))
            .await
        {
            Ok(()) => {
                db.notify(
                    NotifyLevel::Info,
                    &format!("Added {} column to servers", spec.name),
                );
                added.push(spec.name);
            }
            Err(err) => {
                // A concurrent reconcile may have added it first.
                if live_server_columns(db).await?.contains(spec.name) {
                    debug!(column = spec.name, "Column added concurrently");
                } else {
                    db.notify(
                        NotifyLevel::Error,
                        &format!("Failed to add {} column to servers: {}", spec.name, err),
                    );
                    return Err(DatabaseError::schema(SERVERS, err));
                }
            }
        }
    }

    Ok(added)
}
