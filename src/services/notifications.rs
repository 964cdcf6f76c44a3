use std::sync::Arc;

use sqlx::{PgConnection, PgExecutor, PgPool};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::notification::{NewNotification, Notification},
    services::{
        metrics::NOTIFICATIONS_COUNTER,
        push::{push_to_users, PushGateway, PushMessage},
        realtime::{Channel, EventBus, RealtimeEvent},
    },
};

/// Delivery side of notifications: real-time bus and push gateway.
#[derive(Clone)]
pub struct Notifier {
    pub events: Arc<dyn EventBus>,
    pub push: Arc<dyn PushGateway>,
}

impl Notifier {
    pub fn new(events: Arc<dyn EventBus>, push: Arc<dyn PushGateway>) -> Self {
        Self { events, push }
    }

    /// Emit already-persisted notifications: one real-time event per
    /// recipient, then push in the background. Call only after commit.
    pub fn dispatch(&self, pool: &PgPool, notifications: &[Notification]) {
        for n in notifications {
            self.events
                .publish(&Channel::User(n.recipient_id), RealtimeEvent::new("notification", n));
        }

        if notifications.is_empty() {
            return;
        }
        let pool = pool.clone();
        let gateway = self.push.clone();
        let batch: Vec<(Uuid, PushMessage)> = notifications
            .iter()
            .map(|n| {
                (
                    n.recipient_id,
                    PushMessage {
                        title: n.title.clone(),
                        body: n.message.clone(),
                        data: Some(serde_json::json!({
                            "notification_id": n.id,
                            "commande_id": n.commande_id,
                            "kind": n.kind,
                        })),
                    },
                )
            })
            .collect();
        tokio::spawn(async move {
            for (user_id, message) in batch {
                push_to_users(&pool, gateway.as_ref(), &[user_id], &message).await;
            }
        });
    }
}

/// Insert notification rows. Runs on the caller's connection so it can share
/// the transaction of the event that produced them.
pub async fn create_many(
    conn: &mut PgConnection,
    items: &[NewNotification],
) -> anyhow::Result<Vec<Notification>> {
    let mut created = Vec::with_capacity(items.len());
    for item in items {
        let n = sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications (recipient_id, commande_id, kind, title, message)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(item.recipient_id)
        .bind(item.commande_id)
        .bind(item.kind.as_str())
        .bind(&item.title)
        .bind(&item.message)
        .fetch_one(&mut *conn)
        .await?;
        NOTIFICATIONS_COUNTER.with_label_values(&[item.kind.as_str()]).inc();
        created.push(n);
    }
    Ok(created)
}

/// Ids of every active admin account.
pub async fn admin_ids<'e, E: PgExecutor<'e>>(exec: E) -> anyhow::Result<Vec<Uuid>> {
    let ids = sqlx::query_scalar("SELECT id FROM users WHERE role = 'admin' AND is_active = TRUE ORDER BY created_at")
        .fetch_all(exec)
        .await?;
    Ok(ids)
}

/// Order-event audience: client, pharmacy owner, then every admin, each once.
pub fn order_recipients(client_id: Uuid, pharmacy_owner: Uuid, admins: &[Uuid]) -> Vec<Uuid> {
    let mut out = Vec::with_capacity(admins.len() + 2);
    for id in [client_id, pharmacy_owner].into_iter().chain(admins.iter().copied()) {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

pub async fn list(
    pool: &PgPool,
    user_id: Uuid,
    only_unread: bool,
    offset: i64,
    per_page: i64,
) -> anyhow::Result<Vec<Notification>> {
    let rows = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications
         WHERE recipient_id = $1 AND ($2 = FALSE OR lu = FALSE)
         ORDER BY created_at DESC
         LIMIT $3 OFFSET $4",
    )
    .bind(user_id)
    .bind(only_unread)
    .bind(per_page)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> anyhow::Result<i64> {
    let count = sqlx::query_scalar(
        "SELECT COUNT(*)::BIGINT FROM notifications WHERE recipient_id = $1 AND lu = FALSE",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Mark one notification read. Marking an already read notification succeeds.
pub async fn mark_read(pool: &PgPool, user_id: Uuid, id: Uuid) -> ApiResult<Notification> {
    sqlx::query_as::<_, Notification>(
        "UPDATE notifications SET lu = TRUE
         WHERE id = $1 AND recipient_id = $2
         RETURNING *",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Notification"))
}

pub async fn mark_all_read(pool: &PgPool, user_id: Uuid) -> anyhow::Result<u64> {
    let res = sqlx::query("UPDATE notifications SET lu = TRUE WHERE recipient_id = $1 AND lu = FALSE")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

pub async fn delete(pool: &PgPool, user_id: Uuid, id: Uuid) -> ApiResult<()> {
    let res = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_id = $2")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::order_recipients;
    use uuid::Uuid;

    #[test]
    fn recipients_keep_order_and_drop_duplicates() {
        let client = Uuid::new_v4();
        let owner = Uuid::new_v4();
        let a1 = Uuid::new_v4();
        let a2 = Uuid::new_v4();
        assert_eq!(order_recipients(client, owner, &[a1, a2]), vec![client, owner, a1, a2]);
        // An admin who also placed the order is notified once.
        assert_eq!(order_recipients(a1, owner, &[a1, a2]), vec![a1, owner, a2]);
        assert_eq!(order_recipients(client, owner, &[]), vec![client, owner]);
    }
}
