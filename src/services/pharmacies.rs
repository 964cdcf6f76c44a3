use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{
        demande::{Demande, DemandeKind},
        notification::{NewNotification, NotificationKind},
        pharmacy::{Pharmacy, PharmacyFilters, PharmacyModification, PharmacyView},
    },
    services::notifications::{self, Notifier},
};

pub struct PharmacyService;

impl PharmacyService {
    /// Approved pharmacies, optionally filtered. `de_garde` compares against
    /// the current time so an expired garde period no longer matches.
    pub async fn list_public(pool: &PgPool, filters: &PharmacyFilters) -> anyhow::Result<Vec<PharmacyView>> {
        let pattern = filters
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{s}%"));
        let city = filters.city.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let rows = sqlx::query_as::<_, Pharmacy>(
            "SELECT * FROM pharmacies
             WHERE approval_status = 'approuvee'
               AND ($1::TEXT IS NULL OR city ILIKE $1)
               AND ($2::TEXT IS NULL OR name ILIKE $2 OR address ILIKE $2)
               AND ($3::BOOLEAN IS NULL OR delivery_available = $3)
               AND ($4::BOOLEAN IS NULL
                    OR $4 = (garde_start IS NOT NULL AND garde_end IS NOT NULL
                             AND garde_start <= NOW() AND NOW() < garde_end))
             ORDER BY name",
        )
        .bind(city)
        .bind(pattern)
        .bind(filters.livraison)
        .bind(filters.de_garde)
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(PharmacyView::from).collect())
    }

    pub async fn get_public(pool: &PgPool, id: Uuid) -> ApiResult<PharmacyView> {
        let pharmacy = sqlx::query_as::<_, Pharmacy>(
            "SELECT * FROM pharmacies WHERE id = $1 AND approval_status = 'approuvee'",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Pharmacie"))?;
        Ok(pharmacy.into())
    }

    pub async fn get_mine(pool: &PgPool, owner_id: Uuid) -> ApiResult<PharmacyView> {
        Ok(Self::owned(pool, owner_id).await?.into())
    }

    /// Profile changes go through an admin-approved demande.
    pub async fn request_modification(
        pool: &PgPool,
        notifier: &Notifier,
        owner_id: Uuid,
        changes: &PharmacyModification,
    ) -> ApiResult<Demande> {
        if changes.is_empty() {
            return Err(ApiError::bad_request("Aucune modification demandée"));
        }
        for value in [&changes.name, &changes.address, &changes.city].into_iter().flatten() {
            if value.trim().is_empty() {
                return Err(ApiError::bad_request("Les champs nom, adresse et ville ne peuvent pas être vides"));
            }
        }
        let pharmacy = Self::owned(pool, owner_id).await?;
        if !pharmacy.is_approved() {
            return Err(ApiError::bad_request("La pharmacie n'est pas encore approuvée"));
        }

        let payload = serde_json::to_value(changes).map_err(anyhow::Error::from)?;
        Self::open_demande(pool, notifier, &pharmacy, DemandeKind::ModificationProfil, payload).await
    }

    pub async fn request_deletion(
        pool: &PgPool,
        notifier: &Notifier,
        owner_id: Uuid,
        reason: Option<&str>,
    ) -> ApiResult<Demande> {
        let pharmacy = Self::owned(pool, owner_id).await?;
        let payload = serde_json::json!({ "reason": reason });
        Self::open_demande(pool, notifier, &pharmacy, DemandeKind::SuppressionCompte, payload).await
    }

    /// Declare a garde period. `end` must be after `start` and in the future.
    pub async fn set_garde(
        pool: &PgPool,
        owner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ApiResult<PharmacyView> {
        validate_garde(start, end, Utc::now())?;
        let pharmacy = Self::owned(pool, owner_id).await?;
        if !pharmacy.is_approved() {
            return Err(ApiError::bad_request("La pharmacie n'est pas encore approuvée"));
        }
        let updated = sqlx::query_as::<_, Pharmacy>(
            "UPDATE pharmacies SET garde_start = $2, garde_end = $3, updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(pharmacy.id)
        .bind(start)
        .bind(end)
        .fetch_one(pool)
        .await?;
        tracing::info!(pharmacy_id = %pharmacy.id, %start, %end, "garde period set");
        Ok(updated.into())
    }

    pub async fn clear_garde(pool: &PgPool, owner_id: Uuid) -> ApiResult<PharmacyView> {
        let pharmacy = Self::owned(pool, owner_id).await?;
        let updated = sqlx::query_as::<_, Pharmacy>(
            "UPDATE pharmacies SET garde_start = NULL, garde_end = NULL, updated_at = NOW()
             WHERE id = $1 RETURNING *",
        )
        .bind(pharmacy.id)
        .fetch_one(pool)
        .await?;
        Ok(updated.into())
    }

    async fn owned(pool: &PgPool, owner_id: Uuid) -> ApiResult<Pharmacy> {
        sqlx::query_as::<_, Pharmacy>(
            "SELECT * FROM pharmacies WHERE owner_id = $1 AND approval_status <> 'supprimee'",
        )
        .bind(owner_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Pharmacie"))
    }

    async fn open_demande(
        pool: &PgPool,
        notifier: &Notifier,
        pharmacy: &Pharmacy,
        kind: DemandeKind,
        payload: serde_json::Value,
    ) -> ApiResult<Demande> {
        let mut tx = pool.begin().await?;

        let pending: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM demandes
                           WHERE pharmacy_id = $1 AND kind = $2 AND status = 'en_attente')",
        )
        .bind(pharmacy.id)
        .bind(kind.as_str())
        .fetch_one(&mut *tx)
        .await?;
        if pending {
            return Err(ApiError::Conflict("Une demande de ce type est déjà en attente".into()));
        }

        let demande = sqlx::query_as::<_, Demande>(
            "INSERT INTO demandes (requester_id, pharmacy_id, kind, payload)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(pharmacy.owner_id)
        .bind(pharmacy.id)
        .bind(kind.as_str())
        .bind(&payload)
        .fetch_one(&mut *tx)
        .await?;

        let title = match kind {
            DemandeKind::CreationPharmacie => "Nouvelle pharmacie à valider",
            DemandeKind::ModificationProfil => "Demande de modification de profil",
            DemandeKind::SuppressionCompte => "Demande de suppression de compte",
        };
        let admins = notifications::admin_ids(&mut *tx).await?;
        let items: Vec<NewNotification> = admins
            .into_iter()
            .map(|admin| NewNotification {
                recipient_id: admin,
                commande_id: None,
                kind: NotificationKind::Demande,
                title: title.to_string(),
                message: format!("{} : {}", pharmacy.name, title.to_lowercase()),
            })
            .collect();
        let created = notifications::create_many(&mut tx, &items).await?;

        tx.commit().await?;
        tracing::info!(pharmacy_id = %pharmacy.id, kind = kind.as_str(), demande_id = %demande.id, "demande opened");
        notifier.dispatch(pool, &created);
        Ok(demande)
    }
}

fn validate_garde(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> ApiResult<()> {
    if end <= start {
        return Err(ApiError::bad_request("La fin de garde doit être postérieure au début"));
    }
    if end <= now {
        return Err(ApiError::bad_request("La période de garde est déjà terminée"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_garde;
    use chrono::{Duration, Utc};

    #[test]
    fn garde_period_must_be_ordered_and_not_over() {
        let now = Utc::now();
        assert!(validate_garde(now, now + Duration::hours(12), now).is_ok());
        // Starting in the past is fine as long as it is still running.
        assert!(validate_garde(now - Duration::hours(2), now + Duration::hours(2), now).is_ok());
        assert!(validate_garde(now, now, now).is_err());
        assert!(validate_garde(now - Duration::hours(5), now - Duration::hours(1), now).is_err());
    }
}
