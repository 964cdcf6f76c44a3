use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    db::tenant::TenantCatalog,
    error::{ApiError, ApiResult},
    models::{
        medicament::Medicament,
        notification::{NewNotification, NotificationKind, Notification},
        pharmacy::Pharmacy,
    },
    services::{catalog::CatalogService, notifications},
};

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct StockAlert {
    pub pharmacy_id: Uuid,
    pub medicament_id: Uuid,
    pub pharmacy_name: String,
    pub created_at: DateTime<Utc>,
}

/// Ask to be told when an out-of-stock medicament is available again.
pub async fn subscribe(
    pool: &PgPool,
    user_id: Uuid,
    pharmacy_id: Uuid,
    medicament_id: Uuid,
) -> ApiResult<()> {
    let (_, catalog) = TenantCatalog::resolve(pool, pharmacy_id).await?;
    let med = CatalogService::get(pool, &catalog, medicament_id).await?;
    if med.stock > 0 {
        return Err(ApiError::bad_request("Ce médicament est déjà disponible"));
    }

    sqlx::query(
        "INSERT INTO stock_alerts (user_id, pharmacy_id, medicament_id)
         VALUES ($1, $2, $3)
         ON CONFLICT DO NOTHING",
    )
    .bind(user_id)
    .bind(pharmacy_id)
    .bind(medicament_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn unsubscribe(
    pool: &PgPool,
    user_id: Uuid,
    pharmacy_id: Uuid,
    medicament_id: Uuid,
) -> ApiResult<()> {
    let res = sqlx::query(
        "DELETE FROM stock_alerts WHERE user_id = $1 AND pharmacy_id = $2 AND medicament_id = $3",
    )
    .bind(user_id)
    .bind(pharmacy_id)
    .bind(medicament_id)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(ApiError::not_found("Alerte"));
    }
    Ok(())
}

pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<StockAlert>> {
    let rows = sqlx::query_as::<_, StockAlert>(
        "SELECT a.pharmacy_id, a.medicament_id, p.name AS pharmacy_name, a.created_at
         FROM stock_alerts a
         JOIN pharmacies p ON p.id = a.pharmacy_id
         WHERE a.user_id = $1
         ORDER BY a.created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Consume the alerts on `med` and persist one notification per subscriber.
/// The caller dispatches the returned notifications after commit.
pub async fn fire(
    conn: &mut PgConnection,
    pharmacy: &Pharmacy,
    med: &Medicament,
) -> anyhow::Result<Vec<Notification>> {
    let subscribers: Vec<Uuid> = sqlx::query_scalar(
        "DELETE FROM stock_alerts WHERE pharmacy_id = $1 AND medicament_id = $2
         RETURNING user_id",
    )
    .bind(pharmacy.id)
    .bind(med.id)
    .fetch_all(&mut *conn)
    .await?;

    if subscribers.is_empty() {
        return Ok(Vec::new());
    }

    let items: Vec<NewNotification> = subscribers
        .into_iter()
        .map(|user_id| NewNotification {
            recipient_id: user_id,
            commande_id: None,
            kind: NotificationKind::StockDisponible,
            title: "Médicament de nouveau disponible".to_string(),
            message: format!("{} est de nouveau en stock chez {}.", med.name, pharmacy.name),
        })
        .collect();

    tracing::info!(
        pharmacy_id = %pharmacy.id,
        medicament_id = %med.id,
        subscribers = items.len(),
        "stock alerts fired"
    );
    notifications::create_many(conn, &items).await
}
