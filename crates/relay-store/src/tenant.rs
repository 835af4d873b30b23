//! Tenant (server) operations.
//!
//! Tenant rows are never deleted; deactivation flips `active`. Updates are
//! scoped by id and return the re-read row, or `None` when no row matched.

use sea_query::{Expr, Func, OnConflict, Query, SelectStatement, SimpleExpr};
use tracing::debug;

use crate::error::{DatabaseError, Result};
use crate::models::{Server, Toggle};
use crate::schema::{Servers, DEFAULT_LANG, SENTINEL_ID};
use crate::Database;

fn select_servers() -> SelectStatement {
    Query::select()
        .columns([
            Servers::Id,
            Servers::Lang,
            Servers::Count,
            Servers::Active,
            Servers::EmbedStyle,
            Servers::Bot2BotStyle,
            Servers::WebhookId,
            Servers::WebhookToken,
            Servers::WebhookActive,
        ])
        .from(Servers::Table)
        .to_owned()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Register a new tenant.
///
/// Fails with [`DatabaseError::DuplicateTenant`] if the id is taken.
pub async fn register_tenant(db: &Database, id: &str, lang: &str) -> Result<()> {
    let stmt = Query::insert()
        .into_table(Servers::Table)
        .columns([Servers::Id, Servers::Lang])
        .values_panic([id.into(), lang.into()])
        .to_owned();

    db.backend().execute(&stmt).await.map_err(|e| {
        if is_unique_violation(&e) {
            return DatabaseError::DuplicateTenant { id: id.to_string() };
        }
        DatabaseError::Store(e)
    })?;

    debug!(tenant_id = id, lang, "Registered tenant");
    Ok(())
}

/// Get a tenant by id.
pub async fn get_tenant(db: &Database, id: &str) -> Result<Option<Server>> {
    let stmt = select_servers()
        .and_where(Expr::col(Servers::Id).eq(id))
        .to_owned();

    Ok(db.backend().fetch_optional::<Server>(&stmt).await?)
}

/// List every tenant row, sentinel included.
pub async fn list_tenants(db: &Database) -> Result<Vec<Server>> {
    let stmt = select_servers()
        .order_by(Servers::Id, sea_query::Order::Asc)
        .to_owned();

    Ok(db.backend().fetch_all::<Server>(&stmt).await?)
}

/// Count all tenant rows, sentinel included.
pub async fn count_all(db: &Database) -> Result<i64> {
    let stmt = Query::select()
        .expr(Func::count(Expr::col(Servers::Id)))
        .from(Servers::Table)
        .to_owned();

    Ok(db.backend().fetch_count(&stmt).await?)
}

async fn update_tenant(
    db: &Database,
    id: &str,
    values: Vec<(Servers, SimpleExpr)>,
) -> Result<Option<Server>> {
    let stmt = Query::update()
        .table(Servers::Table)
        .values(values)
        .and_where(Expr::col(Servers::Id).eq(id))
        .to_owned();

    if db.backend().execute(&stmt).await? == 0 {
        debug!(tenant_id = id, "No tenant matched update");
        return Ok(None);
    }

    get_tenant(db, id).await
}

/// Deactivate a tenant. Its row and history are kept.
pub async fn deactivate_tenant(db: &Database, id: &str) -> Result<Option<Server>> {
    update_tenant(db, id, vec![(Servers::Active, false.into())]).await
}

/// Set the tenant's language.
pub async fn set_language(db: &Database, id: &str, lang: &str) -> Result<Option<Server>> {
    update_tenant(db, id, vec![(Servers::Lang, lang.into())]).await
}

/// Set whether relayed messages are rendered as embeds.
pub async fn set_embed_style(db: &Database, id: &str, style: Toggle) -> Result<Option<Server>> {
    update_tenant(db, id, vec![(Servers::EmbedStyle, style.as_str().into())]).await
}

/// Set whether messages from other bots are relayed.
pub async fn set_bot2bot_style(db: &Database, id: &str, style: Toggle) -> Result<Option<Server>> {
    update_tenant(db, id, vec![(Servers::Bot2BotStyle, style.as_str().into())]).await
}

/// Store the tenant's external delivery endpoint.
pub async fn set_webhook(
    db: &Database,
    id: &str,
    webhook_id: &str,
    webhook_token: &str,
    webhook_active: bool,
) -> Result<Option<Server>> {
    update_tenant(
        db,
        id,
        vec![
            (Servers::WebhookId, webhook_id.into()),
            (Servers::WebhookToken, webhook_token.into()),
            (Servers::WebhookActive, webhook_active.into()),
        ],
    )
    .await
}

/// Deactivate the tenant's webhook, keeping its id and token.
pub async fn clear_webhook(db: &Database, id: &str) -> Result<Option<Server>> {
    update_tenant(db, id, vec![(Servers::WebhookActive, false.into())]).await
}

/// Atomically add one to the tenant's usage counter.
///
/// Returns whether a row matched.
pub async fn increment_usage(db: &Database, id: &str) -> Result<bool> {
    let stmt = Query::update()
        .table(Servers::Table)
        .value(Servers::Count, Expr::col(Servers::Count).add(1))
        .and_where(Expr::col(Servers::Id).eq(id))
        .to_owned();

    Ok(db.backend().execute(&stmt).await? > 0)
}

/// Make sure the sentinel row exists without touching an existing one.
pub async fn ensure_sentinel(db: &Database) -> Result<bool> {
    let stmt = Query::insert()
        .into_table(Servers::Table)
        .columns([Servers::Id, Servers::Lang])
        .values_panic([SENTINEL_ID.into(), DEFAULT_LANG.into()])
        .on_conflict(OnConflict::column(Servers::Id).do_nothing().to_owned())
        .to_owned();

    let created = db.backend().execute(&stmt).await? > 0;
    if created {
        debug!("Created sentinel tenant");
    }
    Ok(created)
}

/// Create a tenant row for every known group that has none.
///
/// Also ensures the sentinel row. A tenant created concurrently by another
/// caller counts as present, not as an error. Returns how many rows this
/// call created.
pub async fn ensure_seeded<S: AsRef<str>>(db: &Database, known_group_ids: &[S]) -> Result<usize> {
    ensure_sentinel(db).await?;

    let mut created = 0;
    for id in known_group_ids {
        let id = id.as_ref();
        if id == SENTINEL_ID || get_tenant(db, id).await?.is_some() {
            continue;
        }

        match register_tenant(db, id, DEFAULT_LANG).await {
            Ok(()) => created += 1,
            Err(DatabaseError::DuplicateTenant { .. }) => {
                debug!(tenant_id = id, "Tenant registered concurrently");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_db;

    #[tokio::test]
    async fn test_register_and_get() {
        let db = test_db().await;
        register_tenant(&db, "g1", "fr").await.unwrap();

        let server = get_tenant(&db, "g1").await.unwrap().unwrap();
        assert_eq!(server.lang, "fr");
        assert_eq!(server.count, 0);
        assert!(server.active);
        assert_eq!(server.embed_style(), Some(Toggle::On));
        assert_eq!(server.bot2bot_style(), Some(Toggle::Off));
        assert!(!server.webhookactive);

        assert!(get_tenant(&db, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_register_duplicate() {
        let db = test_db().await;
        register_tenant(&db, "g1", "en").await.unwrap();

        let result = register_tenant(&db, "g1", "de").await;
        assert!(matches!(result, Err(DatabaseError::DuplicateTenant { ref id }) if id == "g1"));

        // The original row is untouched
        let server = get_tenant(&db, "g1").await.unwrap().unwrap();
        assert_eq!(server.lang, "en");
    }

    #[tokio::test]
    async fn test_deactivate_keeps_row() {
        let db = test_db().await;
        register_tenant(&db, "g1", "en").await.unwrap();

        let server = deactivate_tenant(&db, "g1").await.unwrap().unwrap();
        assert!(!server.active);
        assert_eq!(count_all(&db).await.unwrap(), 2);

        // Unknown tenant is a no-op
        assert!(deactivate_tenant(&db, "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_partial_updates() {
        let db = test_db().await;
        register_tenant(&db, "g1", "en").await.unwrap();

        let server = set_language(&db, "g1", "ja").await.unwrap().unwrap();
        assert_eq!(server.lang, "ja");

        let server = set_embed_style(&db, "g1", Toggle::Off).await.unwrap().unwrap();
        assert_eq!(server.embedstyle, "off");

        let server = set_bot2bot_style(&db, "g1", Toggle::On).await.unwrap().unwrap();
        assert_eq!(server.bot2botstyle, "on");
        assert_eq!(server.lang, "ja");

        assert!(set_language(&db, "nobody", "ja").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_updates_do_not_leak_between_tenants() {
        let db = test_db().await;
        register_tenant(&db, "g1", "en").await.unwrap();
        register_tenant(&db, "g2", "en").await.unwrap();

        set_embed_style(&db, "g1", Toggle::Off).await.unwrap();
        set_webhook(&db, "g2", "hook-2", "token-2", true).await.unwrap();

        let g1 = get_tenant(&db, "g1").await.unwrap().unwrap();
        let g2 = get_tenant(&db, "g2").await.unwrap().unwrap();
        assert_eq!(g1.embedstyle, "off");
        assert!(g1.webhookid.is_none());
        assert_eq!(g2.embedstyle, "on");
        assert_eq!(g2.webhookid.as_deref(), Some("hook-2"));
    }

    #[tokio::test]
    async fn test_webhook_lifecycle() {
        let db = test_db().await;
        register_tenant(&db, "g1", "en").await.unwrap();

        let server = set_webhook(&db, "g1", "123", "secret", true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(server.webhookid.as_deref(), Some("123"));
        assert_eq!(server.webhooktoken.as_deref(), Some("secret"));
        assert!(server.webhookactive);

        let server = clear_webhook(&db, "g1").await.unwrap().unwrap();
        assert!(!server.webhookactive);
        assert_eq!(server.webhookid.as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn test_increment_usage() {
        let db = test_db().await;
        register_tenant(&db, "g1", "en").await.unwrap();

        for _ in 0..3 {
            assert!(increment_usage(&db, "g1").await.unwrap());
        }
        assert!(!increment_usage(&db, "nobody").await.unwrap());

        let server = get_tenant(&db, "g1").await.unwrap().unwrap();
        assert_eq!(server.count, 3);
    }

    #[tokio::test]
    async fn test_ensure_sentinel_keeps_language() {
        let db = test_db().await;
        set_language(&db, SENTINEL_ID, "es").await.unwrap();

        assert!(!ensure_sentinel(&db).await.unwrap());
        let sentinel = get_tenant(&db, SENTINEL_ID).await.unwrap().unwrap();
        assert_eq!(sentinel.lang, "es");
    }

    #[tokio::test]
    async fn test_ensure_seeded_is_idempotent() {
        let db = test_db().await;
        register_tenant(&db, "g2", "de").await.unwrap();

        let created = ensure_seeded(&db, &["g1", "g2", "g3"]).await.unwrap();
        assert_eq!(created, 2);

        let created = ensure_seeded(&db, &["g1", "g2", "g3"]).await.unwrap();
        assert_eq!(created, 0);

        // bot + g1..g3
        let tenants = list_tenants(&db).await.unwrap();
        let ids: Vec<&str> = tenants.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["bot", "g1", "g2", "g3"]);

        // Existing settings survive seeding
        let g2 = get_tenant(&db, "g2").await.unwrap().unwrap();
        assert_eq!(g2.lang, "de");
    }

    #[tokio::test]
    async fn test_ensure_seeded_skips_sentinel_id() {
        let db = test_db().await;
        let created = ensure_seeded(&db, &[SENTINEL_ID]).await.unwrap();
        assert_eq!(created, 0);
        assert_eq!(count_all(&db).await.unwrap(), 1);
    }
}
