use futures_util::future::BoxFuture;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::services::metrics::PUSH_FAILURES_COUNTER;

#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PushTarget {
    pub user_id: Uuid,
    pub platform: String,
    pub token: String,
}

/// Outbound push delivery.
pub trait PushGateway: Send + Sync {
    fn send<'a>(
        &'a self,
        target: &'a PushTarget,
        message: &'a PushMessage,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Firebase Cloud Messaging (legacy HTTP API). Web, Android and iOS tokens
/// are all registered through FCM.
pub struct FcmGateway {
    pub client: Client,
    pub fcm_api_key: Option<String>,
}

impl FcmGateway {
    pub fn new(fcm_api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            fcm_api_key,
        }
    }

    async fn send_fcm(&self, token: &str, message: &PushMessage) -> anyhow::Result<()> {
        let api_key = match &self.fcm_api_key {
            Some(k) => k,
            None => {
                tracing::debug!("FCM not configured, skipping push notification");
                return Ok(());
            }
        };

        let mut payload = json!({
            "to": token,
            "notification": {
                "title": message.title,
                "body": message.body,
            }
        });

        if let Some(d) = &message.data {
            payload["data"] = d.clone();
        }

        let response = self
            .client
            .post("https://fcm.googleapis.com/fcm/send")
            .header("Authorization", format!("key={}", api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("FCM error {status}: {text}");
        }

        Ok(())
    }
}

impl PushGateway for FcmGateway {
    fn send<'a>(
        &'a self,
        target: &'a PushTarget,
        message: &'a PushMessage,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.send_fcm(&target.token, message))
    }
}

pub async fn register_push_token(
    pool: &PgPool,
    user_id: Uuid,
    platform: &str,
    token: &str,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO push_tokens (user_id, platform, token)
         VALUES ($1, $2, $3)
         ON CONFLICT (user_id, token) DO NOTHING",
    )
    .bind(user_id)
    .bind(platform)
    .bind(token)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn unregister_push_token(pool: &PgPool, user_id: Uuid, token: &str) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM push_tokens WHERE user_id = $1 AND token = $2")
        .bind(user_id)
        .bind(token)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Send `message` to every registered device of `user_ids`.
/// Failures are logged and counted, never retried nor propagated.
pub async fn push_to_users(
    pool: &PgPool,
    gateway: &dyn PushGateway,
    user_ids: &[Uuid],
    message: &PushMessage,
) {
    if user_ids.is_empty() {
        return;
    }
    let targets: Vec<PushTarget> = match sqlx::query_as(
        "SELECT user_id, platform, token FROM push_tokens WHERE user_id = ANY($1)",
    )
    .bind(user_ids)
    .fetch_all(pool)
    .await
    {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!("could not load push tokens: {e}");
            return;
        }
    };

    for target in &targets {
        if let Err(e) = gateway.send(target, message).await {
            PUSH_FAILURES_COUNTER.with_label_values(&[&target.platform]).inc();
            tracing::warn!(user_id = %target.user_id, "push delivery failed: {e}");
        }
    }
}
