//! Relay task operations.
//!
//! Tasks are stored directionally but torn down symmetrically: removing
//! `a -> b` also removes `b -> a`. Only [`list_active_for_origin`] filters on
//! the `active` flag; lookups and deletes match regardless of it.

use futures::future::join_all;
use sea_query::{Cond, Expr, Func, OnConflict, Order, Query, SelectStatement};
use tracing::{debug, warn};

use crate::error::Result;
use crate::models::{OriginId, Task, UpsertReport};
use crate::notify::NotifyLevel;
use crate::schema::{Tasks, TASK_IDENTITY};
use crate::Database;

/// Destination keyword selecting every edge of an origin.
pub const DEST_ALL: &str = "all";

/// Destination keyword for relays back to the requesting user.
pub const DEST_ME: &str = "me";

fn select_tasks() -> SelectStatement {
    Query::select()
        .columns([
            Tasks::Origin,
            Tasks::Dest,
            Tasks::Reply,
            Tasks::Server,
            Tasks::Active,
            Tasks::LangTo,
            Tasks::LangFrom,
        ])
        .from(Tasks::Table)
        .order_by(Tasks::Dest, Order::Asc)
        .order_by(Tasks::LangTo, Order::Asc)
        .to_owned()
}

/// Create or update one active task per destination.
///
/// Each destination is an independent write keyed by
/// `(origin, dest, LangTo, LangFrom)`; writes may complete in any order and a
/// failed destination never aborts its siblings. Failures are reported, not
/// returned.
pub async fn upsert_task<S: AsRef<str>>(
    db: &Database,
    origin: &OriginId,
    destinations: &[S],
    reply: &str,
    server: &str,
    lang_from: &str,
    lang_to: &str,
) -> UpsertReport {
    let origin_key = origin.to_key();

    let writes = destinations.iter().map(|dest| {
        let dest = dest.as_ref();
        let stmt = Query::insert()
            .into_table(Tasks::Table)
            .columns([
                Tasks::Origin,
                Tasks::Dest,
                Tasks::Reply,
                Tasks::Server,
                Tasks::Active,
                Tasks::LangTo,
                Tasks::LangFrom,
            ])
            .values_panic([
                origin_key.as_str().into(),
                dest.into(),
                reply.into(),
                server.into(),
                true.into(),
                lang_to.into(),
                lang_from.into(),
            ])
            .on_conflict(
                OnConflict::columns(TASK_IDENTITY)
                    .update_columns([Tasks::Reply, Tasks::Server, Tasks::Active])
                    .to_owned(),
            )
            .to_owned();

        async move { (dest, db.backend().execute(&stmt).await) }
    });

    let mut report = UpsertReport::default();
    for (dest, result) in join_all(writes).await {
        match result {
            Ok(_) => {
                report.written += 1;
                debug!(origin = %origin_key, dest, "Task upserted");
                db.notify(NotifyLevel::Dev, "Task added successfully.");
            }
            Err(err) => {
                report.failed += 1;
                warn!(origin = %origin_key, dest, error = %err, "Task upsert failed");
                db.notify(
                    NotifyLevel::Error,
                    &format!("Failed to add task {} -> {}: {}", origin_key, dest, err),
                );
            }
        }
    }

    report
}

/// Active tasks relaying out of `origin`.
pub async fn list_active_for_origin(db: &Database, origin: &OriginId) -> Result<Vec<Task>> {
    let stmt = select_tasks()
        .and_where(Expr::col(Tasks::Origin).eq(origin.to_key()))
        .and_where(Expr::col(Tasks::Active).eq(true))
        .to_owned();

    Ok(db.backend().fetch_all::<Task>(&stmt).await?)
}

/// Tasks of `origin` for listing.
///
/// With [`DEST_ME`] only the edges back to the user are returned; any other
/// `dest` returns every edge of the origin for the caller to filter.
pub async fn list_tasks(db: &Database, origin: &OriginId, dest: &str) -> Result<Vec<Task>> {
    let mut stmt = select_tasks()
        .and_where(Expr::col(Tasks::Origin).eq(origin.to_key()))
        .to_owned();
    if dest == DEST_ME {
        stmt.and_where(Expr::col(Tasks::Dest).eq(DEST_ME));
    }

    Ok(db.backend().fetch_all::<Task>(&stmt).await?)
}

/// Edges from `origin` to `dest`, or every edge of `origin` for [`DEST_ALL`].
pub async fn find_edge(db: &Database, origin: &OriginId, dest: &str) -> Result<Vec<Task>> {
    let mut stmt = select_tasks()
        .and_where(Expr::col(Tasks::Origin).eq(origin.to_key()))
        .to_owned();
    if dest != DEST_ALL {
        stmt.and_where(Expr::col(Tasks::Dest).eq(dest));
    }

    Ok(db.backend().fetch_all::<Task>(&stmt).await?)
}

/// Delete edges symmetrically and return how many rows went.
///
/// With [`DEST_ALL`] every edge touching `origin` at either end is removed;
/// otherwise `origin -> dest` and `dest -> origin`.
pub async fn remove_edge(db: &Database, origin: &OriginId, dest: &str) -> Result<u64> {
    let key = origin.to_key();
    let cond = if dest == DEST_ALL {
        Cond::any()
            .add(Expr::col(Tasks::Origin).eq(key.as_str()))
            .add(Expr::col(Tasks::Dest).eq(key.as_str()))
    } else {
        Cond::any()
            .add(
                Cond::all()
                    .add(Expr::col(Tasks::Origin).eq(key.as_str()))
                    .add(Expr::col(Tasks::Dest).eq(dest)),
            )
            .add(
                Cond::all()
                    .add(Expr::col(Tasks::Origin).eq(dest))
                    .add(Expr::col(Tasks::Dest).eq(key.as_str())),
            )
    };

    let stmt = Query::delete()
        .from_table(Tasks::Table)
        .cond_where(cond)
        .to_owned();

    let removed = db.backend().execute(&stmt).await?;
    debug!(origin = %key, dest, removed, "Removed tasks");
    Ok(removed)
}

/// Number of task rows with this origin.
pub async fn count_for_origin(db: &Database, origin: &OriginId) -> Result<i64> {
    let stmt = Query::select()
        .expr(Func::count(Expr::col(Tasks::Origin)))
        .from(Tasks::Table)
        .and_where(Expr::col(Tasks::Origin).eq(origin.to_key()))
        .to_owned();

    Ok(db.backend().fetch_count(&stmt).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{recorded_db, test_db};

    fn dests(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.dest.as_str()).collect()
    }

    #[tokio::test]
    async fn test_upsert_fans_out() {
        let db = test_db().await;
        let g1 = OriginId::group("g1");

        let report = upsert_task(&db, &g1, &["g2", "@42"], "g1", "g1", "en", "fr").await;
        assert_eq!(report, UpsertReport { written: 2, failed: 0 });

        let tasks = find_edge(&db, &g1, DEST_ALL).await.unwrap();
        assert_eq!(dests(&tasks), vec!["@42", "g2"]);
        assert!(tasks.iter().all(|t| t.active && t.lang_to == "fr" && t.lang_from == "en"));
        assert_eq!(tasks[0].origin_id(), g1);
    }

    #[tokio::test]
    async fn test_upsert_same_identity_updates_in_place() {
        let db = test_db().await;
        let g1 = OriginId::group("g1");

        upsert_task(&db, &g1, &["g2"], "g1", "g1", "en", "fr").await;
        upsert_task(&db, &g1, &["g2"], "r2", "g9", "en", "fr").await;
        assert_eq!(count_for_origin(&db, &g1).await.unwrap(), 1);

        let task = &find_edge(&db, &g1, "g2").await.unwrap()[0];
        assert_eq!(task.reply, "r2");
        assert_eq!(task.server, "g9");

        // A different language pair is a distinct edge
        upsert_task(&db, &g1, &["g2"], "g1", "g1", "en", "de").await;
        assert_eq!(count_for_origin(&db, &g1).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_reports_each_destination() {
        let (db, notifier) = recorded_db().await;
        let user = OriginId::user("42");

        upsert_task(&db, &user, &[DEST_ME, "g2", "g3"], "@42", "g2", "en", "es").await;
        assert_eq!(notifier.count(NotifyLevel::Dev), 1 + 3);
        assert_eq!(notifier.count(NotifyLevel::Error), 0);
    }

    #[tokio::test]
    async fn test_upsert_failure_is_isolated() {
        let (db, notifier) = recorded_db().await;
        // Writes fail once the table is gone; the call still completes
        db.backend().execute_raw("DROP TABLE tasks").await.unwrap();

        let report = upsert_task(&db, &OriginId::group("g1"), &["g2", "g3"], "g1", "g1", "en", "fr").await;
        assert_eq!(report, UpsertReport { written: 0, failed: 2 });
        assert_eq!(notifier.count(NotifyLevel::Error), 2);
    }

    #[tokio::test]
    async fn test_list_active_for_origin_filters_inactive() {
        let db = test_db().await;
        let g1 = OriginId::group("g1");
        upsert_task(&db, &g1, &["g2", "g3"], "g1", "g1", "en", "fr").await;

        db.backend()
            .execute_raw("UPDATE tasks SET active = FALSE WHERE dest = 'g3'")
            .await
            .unwrap();

        let active = list_active_for_origin(&db, &g1).await.unwrap();
        assert_eq!(dests(&active), vec!["g2"]);

        // Lookups ignore the flag
        assert_eq!(find_edge(&db, &g1, DEST_ALL).await.unwrap().len(), 2);
        assert_eq!(find_edge(&db, &g1, "g3").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_tasks_me() {
        let db = test_db().await;
        let user = OriginId::user("42");
        upsert_task(&db, &user, &[DEST_ME, "g2"], "@42", "g2", "en", "es").await;

        let me = list_tasks(&db, &user, DEST_ME).await.unwrap();
        assert_eq!(dests(&me), vec![DEST_ME]);

        let all = list_tasks(&db, &user, "g2").await.unwrap();
        assert_eq!(dests(&all), vec!["g2", DEST_ME]);
    }

    #[tokio::test]
    async fn test_user_origin_is_stored_with_prefix() {
        let db = test_db().await;
        let user = OriginId::user("42");
        upsert_task(&db, &user, &["g2"], "@42", "g2", "en", "es").await;

        let tasks = list_active_for_origin(&db, &user).await.unwrap();
        assert_eq!(tasks[0].origin, "@42");
        assert!(tasks[0].origin_id().is_user());

        // The bare id is a different (group) origin
        assert_eq!(count_for_origin(&db, &OriginId::group("42")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_edge_is_symmetric() {
        let db = test_db().await;
        let a = OriginId::group("a");
        let b = OriginId::group("b");
        upsert_task(&db, &a, &["b", "c"], "a", "a", "en", "fr").await;
        upsert_task(&db, &b, &["a"], "b", "b", "fr", "en").await;

        let removed = remove_edge(&db, &a, "b").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(dests(&find_edge(&db, &a, DEST_ALL).await.unwrap()), vec!["c"]);
        assert_eq!(count_for_origin(&db, &b).await.unwrap(), 0);

        // Only the reverse edge present
        upsert_task(&db, &b, &["a"], "b", "b", "fr", "en").await;
        assert_eq!(remove_edge(&db, &a, "b").await.unwrap(), 1);
        assert_eq!(count_for_origin(&db, &b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_edge_all() {
        let db = test_db().await;
        let a = OriginId::group("a");
        let b = OriginId::group("b");
        let c = OriginId::group("c");
        upsert_task(&db, &a, &["b", "c"], "a", "a", "en", "fr").await;
        upsert_task(&db, &b, &["a", "c"], "b", "b", "en", "fr").await;
        upsert_task(&db, &c, &["b"], "c", "c", "en", "fr").await;

        let removed = remove_edge(&db, &a, DEST_ALL).await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(count_for_origin(&db, &a).await.unwrap(), 0);
        assert_eq!(dests(&find_edge(&db, &b, DEST_ALL).await.unwrap()), vec!["c"]);
        assert_eq!(dests(&find_edge(&db, &c, DEST_ALL).await.unwrap()), vec!["b"]);
    }

    #[tokio::test]
    async fn test_remove_missing_edge_is_noop() {
        let db = test_db().await;
        assert_eq!(remove_edge(&db, &OriginId::group("x"), "y").await.unwrap(), 0);
    }
}
