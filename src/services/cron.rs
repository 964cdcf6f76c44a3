/// Data retention.
/// Schedule: run daily (e.g. 2 AM UTC via the `purge-data` binary or the
/// in-process loop started by the API).
///
/// Retention:
/// - Read notifications: created + `NOTIFICATION_RETENTION_DAYS` → hard-delete
/// - Email tokens: expired or used for more than a day → hard-delete
/// - Garde periods: ended → cleared

use chrono::{Duration, Utc};
use sqlx::PgPool;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub notifications: u64,
    pub email_tokens: u64,
    pub gardes: u64,
}

pub struct CronService;

impl CronService {
    pub async fn purge_expired_data(pool: &PgPool, retention_days: i64) -> anyhow::Result<PurgeReport> {
        let notif_expiry = Utc::now() - Duration::days(retention_days.max(1));
        let notifications = sqlx::query("DELETE FROM notifications WHERE lu = TRUE AND created_at < $1")
            .bind(notif_expiry)
            .execute(pool)
            .await?
            .rows_affected();
        if notifications > 0 {
            tracing::info!("Purged {notifications} read notifications (older than {retention_days} days)");
        }

        let email_tokens = sqlx::query(
            "DELETE FROM email_tokens
             WHERE expires_at < NOW() OR (used = TRUE AND created_at < NOW() - INTERVAL '1 day')",
        )
        .execute(pool)
        .await?
        .rows_affected();
        if email_tokens > 0 {
            tracing::info!("Purged {email_tokens} expired email tokens");
        }

        // Expired periods already read as off duty; clearing keeps the rows tidy.
        let gardes = sqlx::query(
            "UPDATE pharmacies SET garde_start = NULL, garde_end = NULL
             WHERE garde_end IS NOT NULL AND garde_end < NOW()",
        )
        .execute(pool)
        .await?
        .rows_affected();

        Ok(PurgeReport { notifications, email_tokens, gardes })
    }

    /// Spawn a daily purge loop.
    pub fn start(pool: PgPool, retention_days: i64) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(24 * 3600));
            loop {
                interval.tick().await;
                if let Err(e) = Self::purge_expired_data(&pool, retention_days).await {
                    tracing::warn!("Daily purge failed: {e:#}");
                }
            }
        });
    }
}
