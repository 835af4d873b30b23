//! Aggregate statistics over tenants and tasks.
//!
//! Each figure is its own scalar subquery, composed into a single SELECT with
//! named result columns.

use sea_query::{Alias, Expr, Func, Query, SelectStatement, SimpleExpr};
use tracing::{info, warn};

use crate::error::Result;
use crate::migration;
use crate::models::{FleetStats, OriginId, TenantStats};
use crate::notify::NotifyLevel;
use crate::schema::{Servers, Tasks, SENTINEL_ID};
use crate::Database;

fn scalar(select: SelectStatement) -> SimpleExpr {
    SimpleExpr::SubQuery(None, Box::new(select.into_sub_query_statement()))
}

/// Tenant rows, sentinel excluded.
fn tenants() -> SelectStatement {
    Query::select()
        .from(Servers::Table)
        .and_where(Expr::col(Servers::Id).ne(SENTINEL_ID))
        .to_owned()
}

/// Active tasks, optionally restricted to user origins.
fn active_tasks(user_only: bool) -> SelectStatement {
    let mut stmt = Query::select()
        .expr(Func::count_distinct(Expr::col((Tasks::Table, Tasks::Origin))))
        .from(Tasks::Table)
        .and_where(Expr::col((Tasks::Table, Tasks::Active)).eq(true))
        .to_owned();
    if user_only {
        stmt.and_where(Expr::col((Tasks::Table, Tasks::Origin)).like(OriginId::user_pattern()));
    }
    stmt
}

/// Distinct active-task origins owned by `tenant_id`.
fn owned_tasks(tenant_id: &str, user_only: bool) -> SelectStatement {
    active_tasks(user_only)
        .and_where(Expr::col((Tasks::Table, Tasks::Server)).eq(tenant_id))
        .to_owned()
}

pub(crate) fn fleet_stats_query() -> SelectStatement {
    let total_count = tenants()
        .expr(Func::cast_as(
            Func::coalesce([
                Func::sum(Expr::col(Servers::Count)).into(),
                Expr::val(0).into(),
            ]),
            Alias::new("BIGINT"),
        ))
        .to_owned();

    let total_servers = tenants()
        .expr(Func::count(Expr::col(Servers::Id)))
        .to_owned();

    let active_servers = tenants()
        .expr(Func::count(Expr::col(Servers::Id)))
        .and_where(Expr::col(Servers::Active).eq(true))
        .to_owned();

    let bot_lang = Query::select()
        .column(Servers::Lang)
        .from(Servers::Table)
        .and_where(Expr::col(Servers::Id).eq(SENTINEL_ID))
        .to_owned();

    Query::select()
        .expr_as(scalar(total_count), Alias::new("total_count"))
        .expr_as(scalar(total_servers), Alias::new("total_servers"))
        .expr_as(scalar(active_servers), Alias::new("active_servers"))
        .expr_as(scalar(bot_lang), Alias::new("bot_lang"))
        .expr_as(scalar(active_tasks(false)), Alias::new("active_tasks"))
        .expr_as(scalar(active_tasks(true)), Alias::new("active_user_tasks"))
        .to_owned()
}

pub(crate) fn tenant_stats_query(tenant_id: &str) -> SelectStatement {
    Query::select()
        .columns([
            Servers::Count,
            Servers::Lang,
            Servers::EmbedStyle,
            Servers::Bot2BotStyle,
            Servers::WebhookActive,
            Servers::WebhookId,
            Servers::WebhookToken,
        ])
        .expr_as(scalar(owned_tasks(tenant_id, false)), Alias::new("active_tasks"))
        .expr_as(scalar(owned_tasks(tenant_id, true)), Alias::new("active_user_tasks"))
        .from(Servers::Table)
        .and_where(Expr::col((Servers::Table, Servers::Id)).eq(tenant_id))
        .to_owned()
}

/// Fleet-wide summary.
pub async fn fleet_stats(db: &Database) -> Result<FleetStats> {
    let stats = db
        .backend()
        .fetch_optional::<FleetStats>(&fleet_stats_query())
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;

    Ok(stats)
}

/// Summary for one tenant.
///
/// Returns `Ok(None)` when the tenant has no row. A failed read is treated as
/// schema drift: the servers table is reconciled and `Ok(None)` is returned so
/// the caller can retry. Only a failed repair surfaces as an error.
pub async fn tenant_stats(db: &Database, tenant_id: &str) -> Result<Option<TenantStats>> {
    match db
        .backend()
        .fetch_optional::<TenantStats>(&tenant_stats_query(tenant_id))
        .await
    {
        Ok(stats) => Ok(stats),
        Err(err) => {
            warn!(tenant_id, error = %err, "Tenant stats read failed, reconciling schema");
            db.notify(
                NotifyLevel::Error,
                &format!("Tenant stats for {} failed: {}", tenant_id, err),
            );

            let added = migration::reconcile_schema(db).await?;
            info!(tenant_id, columns_added = added.len(), "Schema repaired after stats failure");
            Ok(None)
        }
    }
}
