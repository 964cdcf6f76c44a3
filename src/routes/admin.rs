use axum::extract::State;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{ok, ApiResult},
    extract::{Json, Path, Query},
    middleware::auth::require_admin,
    models::{
        auth::AuthenticatedUser,
        commande::CommandeQuery,
        demande::{DemandeQuery, RejectDemandeRequest},
        pharmacy::AdminPharmacyQuery,
        user::{SetActiveRequest, UserQuery},
    },
    services::{admin::AdminService, commandes::CommandeService},
    AppState,
};

pub async fn list_demandes(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<DemandeQuery>,
) -> ApiResult<Json<Value>> {
    require_admin(&user)?;
    Ok(ok(AdminService::list_demandes(&state.db, &query).await?))
}

pub async fn approve_demande(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    require_admin(&user)?;
    let demande = AdminService::approve_demande(
        &state.db,
        &state.notifier,
        state.email.as_deref(),
        user.user_id,
        id,
    )
    .await?;
    Ok(ok(demande))
}

pub async fn reject_demande(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectDemandeRequest>,
) -> ApiResult<Json<Value>> {
    require_admin(&user)?;
    let demande = AdminService::reject_demande(
        &state.db,
        &state.notifier,
        state.email.as_deref(),
        user.user_id,
        id,
        body.comment.as_deref(),
    )
    .await?;
    Ok(ok(demande))
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<Value>> {
    require_admin(&user)?;
    Ok(ok(AdminService::list_users(&state.db, &query).await?))
}

pub async fn set_user_active(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<SetActiveRequest>,
) -> ApiResult<Json<Value>> {
    require_admin(&user)?;
    Ok(ok(AdminService::set_user_active(&state.db, user.user_id, id, body.is_active).await?))
}

pub async fn verify_user_email(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    require_admin(&user)?;
    Ok(ok(AdminService::verify_user_email(&state.db, id).await?))
}

pub async fn list_pharmacies(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<AdminPharmacyQuery>,
) -> ApiResult<Json<Value>> {
    require_admin(&user)?;
    Ok(ok(AdminService::list_pharmacies(&state.db, &query).await?))
}

pub async fn list_commandes(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<CommandeQuery>,
) -> ApiResult<Json<Value>> {
    require_admin(&user)?;
    Ok(ok(CommandeService::list_all(&state.db, &query).await?))
}
