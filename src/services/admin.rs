//! Admin moderation: the demande workflow and account management.
//!
//! Approving a `creation_pharmacie` demande provisions the pharmacy catalog
//! schema; approving a `suppression_compte` demande deactivates the owner and
//! drops the schema once the transaction has committed.

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    db::tenant::{catalog_schema_name, drop_catalog_schema, is_catalog_schema, provision_catalog_schema},
    error::{ApiError, ApiResult},
    models::{
        commande::Commande,
        demande::{Demande, DemandeKind, DemandeQuery},
        notification::{NewNotification, NotificationKind},
        pharmacy::{AdminPharmacyQuery, Pharmacy, PharmacyModification, PharmacyView},
        user::{User, UserProfile, UserQuery, USER_COLS},
        PaginationQuery,
    },
    services::{
        auth::find_by_id,
        email::EmailService,
        notifications::{self, Notifier},
    },
};

const DEMANDE_PENDING: &str = "en_attente";

pub struct AdminService;

impl AdminService {
    pub async fn list_demandes(pool: &PgPool, query: &DemandeQuery) -> ApiResult<Vec<Demande>> {
        if let Some(kind) = &query.kind {
            kind.parse::<DemandeKind>()
                .map_err(|_| ApiError::bad_request(format!("Type de demande inconnu : {kind}")))?;
        }
        let rows = sqlx::query_as::<_, Demande>(
            "SELECT * FROM demandes
             WHERE ($1::TEXT IS NULL OR status = $1)
               AND ($2::TEXT IS NULL OR kind = $2)
             ORDER BY created_at DESC",
        )
        .bind(&query.status)
        .bind(&query.kind)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn approve_demande(
        pool: &PgPool,
        notifier: &Notifier,
        email_svc: Option<&EmailService>,
        admin_id: Uuid,
        id: Uuid,
    ) -> ApiResult<Demande> {
        let mut tx = pool.begin().await?;
        let (demande, kind) = lock_pending(&mut tx, id).await?;
        let pharmacy = demande_pharmacy(&mut tx, &demande).await?;

        let mut pending: Vec<NewNotification> = Vec::new();
        let mut drop_schema: Option<String> = None;

        let summary = match kind {
            DemandeKind::CreationPharmacie => {
                let schema = catalog_schema_name(&pharmacy.slug);
                // Idempotent; an orphan empty schema is harmless if the transaction aborts.
                provision_catalog_schema(pool, &schema).await?;
                sqlx::query(
                    "UPDATE pharmacies SET approval_status = 'approuvee', base_medicament = $2, updated_at = NOW()
                     WHERE id = $1",
                )
                .bind(pharmacy.id)
                .bind(&schema)
                .execute(&mut *tx)
                .await?;
                tracing::info!(pharmacy_id = %pharmacy.id, catalog = %schema, "pharmacy approved, catalog provisioned");
                format!("Votre pharmacie {} a été approuvée. Vous pouvez dès à présent gérer votre catalogue.", pharmacy.name)
            }
            DemandeKind::ModificationProfil => {
                let changes: PharmacyModification = serde_json::from_value(demande.payload.clone())
                    .map_err(|e| anyhow::anyhow!("malformed modification payload on demande {id}: {e}"))?;
                apply_modification(&mut tx, pharmacy.id, &changes).await?;
                format!("Les modifications du profil de {} ont été appliquées.", pharmacy.name)
            }
            DemandeKind::SuppressionCompte => {
                sqlx::query("UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
                    .bind(pharmacy.owner_id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(
                    "UPDATE pharmacies SET approval_status = 'supprimee', base_medicament = NULL,
                        garde_start = NULL, garde_end = NULL, updated_at = NOW()
                     WHERE id = $1",
                )
                .bind(pharmacy.id)
                .execute(&mut *tx)
                .await?;
                sqlx::query("DELETE FROM carts WHERE pharmacy_id = $1")
                    .bind(pharmacy.id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM stock_alerts WHERE pharmacy_id = $1")
                    .bind(pharmacy.id)
                    .execute(&mut *tx)
                    .await?;

                // Open orders cannot be fulfilled any more.
                let cancelled = sqlx::query_as::<_, Commande>(
                    "UPDATE commandes SET status = 'annulee', updated_at = NOW()
                     WHERE pharmacy_id = $1 AND status IN ('en_attente', 'en_preparation', 'prete')
                     RETURNING *",
                )
                .bind(pharmacy.id)
                .fetch_all(&mut *tx)
                .await?;
                pending.extend(cancelled.iter().map(|c| NewNotification {
                    recipient_id: c.client_id,
                    commande_id: Some(c.id),
                    kind: NotificationKind::StatutCommande,
                    title: "Commande annulée".to_string(),
                    message: format!("{} a fermé son compte, votre commande a été annulée.", pharmacy.name),
                }));

                drop_schema = pharmacy.base_medicament.clone();
                "Votre compte pharmacie a été supprimé.".to_string()
            }
        };

        let demande = mark_reviewed(&mut tx, id, admin_id, "approuvee", None).await?;
        pending.push(NewNotification {
            recipient_id: demande.requester_id,
            commande_id: None,
            kind: NotificationKind::Compte,
            title: "Demande approuvée".to_string(),
            message: summary.clone(),
        });
        let created = notifications::create_many(&mut tx, &pending).await?;
        tx.commit().await?;

        if let Some(schema) = drop_schema.filter(|s| is_catalog_schema(s)) {
            if let Err(e) = drop_catalog_schema(pool, &schema).await {
                tracing::warn!(catalog = %schema, "catalog drop failed: {e:#}");
            }
        }

        tracing::info!(demande_id = %id, kind = kind.as_str(), %admin_id, "demande approved");
        notifier.dispatch(pool, &created);
        notify_by_email(pool, email_svc, demande.requester_id, "Demande approuvée", &summary, None).await;
        Ok(demande)
    }

    pub async fn reject_demande(
        pool: &PgPool,
        notifier: &Notifier,
        email_svc: Option<&EmailService>,
        admin_id: Uuid,
        id: Uuid,
        comment: Option<&str>,
    ) -> ApiResult<Demande> {
        let comment = comment.map(str::trim).filter(|c| !c.is_empty());

        let mut tx = pool.begin().await?;
        let (demande, kind) = lock_pending(&mut tx, id).await?;
        let pharmacy = demande_pharmacy(&mut tx, &demande).await?;

        if kind == DemandeKind::CreationPharmacie {
            sqlx::query("UPDATE pharmacies SET approval_status = 'rejetee', updated_at = NOW() WHERE id = $1")
                .bind(pharmacy.id)
                .execute(&mut *tx)
                .await?;
        }

        let demande = mark_reviewed(&mut tx, id, admin_id, "rejetee", comment).await?;
        let summary = match kind {
            DemandeKind::CreationPharmacie => format!("L'inscription de {} a été refusée.", pharmacy.name),
            DemandeKind::ModificationProfil => "Votre demande de modification de profil a été refusée.".to_string(),
            DemandeKind::SuppressionCompte => "Votre demande de suppression de compte a été refusée.".to_string(),
        };
        let message = match comment {
            Some(c) => format!("{summary} Motif : {c}"),
            None => summary.clone(),
        };
        let created = notifications::create_many(
            &mut tx,
            &[NewNotification {
                recipient_id: demande.requester_id,
                commande_id: None,
                kind: NotificationKind::Compte,
                title: "Demande refusée".to_string(),
                message,
            }],
        )
        .await?;
        tx.commit().await?;

        tracing::info!(demande_id = %id, kind = kind.as_str(), %admin_id, "demande rejected");
        notifier.dispatch(pool, &created);
        notify_by_email(pool, email_svc, demande.requester_id, "Demande refusée", &summary, comment).await;
        Ok(demande)
    }

    pub async fn list_users(pool: &PgPool, query: &UserQuery) -> anyhow::Result<Vec<UserProfile>> {
        let page = PaginationQuery { page: query.page, per_page: query.per_page };
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users
             WHERE ($1::TEXT IS NULL OR role = $1)
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3"
        ))
        .bind(query.role.map(|r| r.as_str()))
        .bind(page.per_page())
        .bind(page.offset())
        .fetch_all(pool)
        .await?;
        Ok(users.into_iter().map(UserProfile::from).collect())
    }

    pub async fn set_user_active(
        pool: &PgPool,
        admin_id: Uuid,
        user_id: Uuid,
        active: bool,
    ) -> ApiResult<UserProfile> {
        if admin_id == user_id && !active {
            return Err(ApiError::bad_request("Vous ne pouvez pas désactiver votre propre compte"));
        }
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLS}"
        ))
        .bind(user_id)
        .bind(active)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Utilisateur"))?;
        tracing::info!(%user_id, active, %admin_id, "user activation changed");
        Ok(user.into())
    }

    /// Manual verification for deployments without SMTP.
    pub async fn verify_user_email(pool: &PgPool, user_id: Uuid) -> ApiResult<UserProfile> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLS}"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Utilisateur"))?;
        Ok(user.into())
    }

    pub async fn list_pharmacies(pool: &PgPool, query: &AdminPharmacyQuery) -> anyhow::Result<Vec<PharmacyView>> {
        let rows = sqlx::query_as::<_, Pharmacy>(
            "SELECT * FROM pharmacies
             WHERE ($1::TEXT IS NULL OR approval_status = $1)
             ORDER BY created_at DESC",
        )
        .bind(query.status.map(|s| s.as_str()))
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(PharmacyView::from).collect())
    }
}

async fn lock_pending(conn: &mut PgConnection, id: Uuid) -> ApiResult<(Demande, DemandeKind)> {
    let demande = sqlx::query_as::<_, Demande>("SELECT * FROM demandes WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Demande"))?;
    if demande.status != DEMANDE_PENDING {
        return Err(ApiError::Conflict("Cette demande a déjà été traitée".into()));
    }
    let kind: DemandeKind = demande.kind.parse()?;
    Ok((demande, kind))
}

async fn demande_pharmacy(conn: &mut PgConnection, demande: &Demande) -> ApiResult<Pharmacy> {
    let pharmacy_id = demande
        .pharmacy_id
        .ok_or_else(|| anyhow::anyhow!("demande {} has no pharmacy", demande.id))?;
    let pharmacy = sqlx::query_as::<_, Pharmacy>("SELECT * FROM pharmacies WHERE id = $1 FOR UPDATE")
        .bind(pharmacy_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| ApiError::not_found("Pharmacie"))?;
    Ok(pharmacy)
}

async fn apply_modification(
    conn: &mut PgConnection,
    pharmacy_id: Uuid,
    changes: &PharmacyModification,
) -> anyhow::Result<()> {
    sqlx::query(
        "UPDATE pharmacies SET
           name               = COALESCE($2, name),
           address            = COALESCE($3, address),
           city               = COALESCE($4, city),
           phone              = COALESCE($5, phone),
           opening_hours      = COALESCE($6, opening_hours),
           delivery_available = COALESCE($7, delivery_available),
           updated_at         = NOW()
         WHERE id = $1",
    )
    .bind(pharmacy_id)
    .bind(changes.name.as_deref().map(str::trim))
    .bind(changes.address.as_deref().map(str::trim))
    .bind(changes.city.as_deref().map(str::trim))
    .bind(&changes.phone)
    .bind(&changes.opening_hours)
    .bind(changes.delivery_available)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn mark_reviewed(
    conn: &mut PgConnection,
    id: Uuid,
    admin_id: Uuid,
    status: &str,
    comment: Option<&str>,
) -> anyhow::Result<Demande> {
    let demande = sqlx::query_as::<_, Demande>(
        "UPDATE demandes SET status = $2, admin_comment = $3, reviewed_by = $4, reviewed_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(status)
    .bind(comment)
    .bind(admin_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(demande)
}

async fn notify_by_email(
    pool: &PgPool,
    email_svc: Option<&EmailService>,
    user_id: Uuid,
    subject: &str,
    summary: &str,
    comment: Option<&str>,
) {
    let Some(svc) = email_svc else { return };
    let user = match find_by_id(pool, user_id).await {
        Ok(Some(u)) => u,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!(%user_id, "demande email skipped: {e:#}");
            return;
        }
    };
    let name = format!("{} {}", user.first_name, user.last_name);
    if let Err(e) = svc.send_demande_decision(&user.email, &name, subject, summary, comment).await {
        tracing::warn!(%user_id, "demande email failed: {e:#}");
    }
}
