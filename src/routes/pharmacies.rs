use axum::extract::State;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    db::tenant::TenantCatalog,
    error::{ok, ApiResult},
    extract::{Json, Path, Query},
    middleware::auth::require_role,
    models::{
        auth::AuthenticatedUser,
        demande::DeletionRequest,
        medicament::CatalogQuery,
        pharmacy::{GardeRequest, PharmacyFilters, PharmacyModification},
        user::UserRole,
    },
    services::{catalog::CatalogService, pharmacies::PharmacyService},
    AppState,
};

// ─── Public ──────────────────────────────────────────────────────────────────

pub async fn list(
    State(state): State<AppState>,
    Query(filters): Query<PharmacyFilters>,
) -> ApiResult<Json<Value>> {
    Ok(ok(PharmacyService::list_public(&state.db, &filters).await?))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Value>> {
    Ok(ok(PharmacyService::get_public(&state.db, id).await?))
}

/// Catalog of one pharmacy as seen by clients.
pub async fn catalog(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<Value>> {
    let (_, catalog) = TenantCatalog::resolve(&state.db, id).await?;
    Ok(ok(CatalogService::list(&state.db, &catalog, &query).await?))
}

pub async fn medicament(
    State(state): State<AppState>,
    Path((id, medicament_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    let (_, catalog) = TenantCatalog::resolve(&state.db, id).await?;
    Ok(ok(CatalogService::get(&state.db, &catalog, medicament_id).await?))
}

// ─── Owner ───────────────────────────────────────────────────────────────────

pub async fn mine(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult<Json<Value>> {
    require_role(&user, &[UserRole::Pharmacie])?;
    Ok(ok(PharmacyService::get_mine(&state.db, user.user_id).await?))
}

pub async fn request_modification(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<PharmacyModification>,
) -> ApiResult<Json<Value>> {
    require_role(&user, &[UserRole::Pharmacie])?;
    let demande =
        PharmacyService::request_modification(&state.db, &state.notifier, user.user_id, &body).await?;
    Ok(ok(demande))
}

pub async fn request_deletion(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<DeletionRequest>,
) -> ApiResult<Json<Value>> {
    require_role(&user, &[UserRole::Pharmacie])?;
    let demande = PharmacyService::request_deletion(
        &state.db,
        &state.notifier,
        user.user_id,
        body.reason.as_deref(),
    )
    .await?;
    Ok(ok(demande))
}

pub async fn set_garde(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<GardeRequest>,
) -> ApiResult<Json<Value>> {
    require_role(&user, &[UserRole::Pharmacie])?;
    Ok(ok(PharmacyService::set_garde(&state.db, user.user_id, body.start, body.end).await?))
}

pub async fn clear_garde(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult<Json<Value>> {
    require_role(&user, &[UserRole::Pharmacie])?;
    Ok(ok(PharmacyService::clear_garde(&state.db, user.user_id).await?))
}
