use axum::{extract::State, http::StatusCode};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    db::tenant::TenantCatalog,
    error::{ok, ok_message, ApiResult},
    extract::{Json, Path, Query},
    middleware::auth::require_role,
    models::{
        auth::AuthenticatedUser,
        medicament::{AdjustStockRequest, CatalogQuery, CreateMedicamentRequest, UpdateMedicamentRequest},
        pharmacy::Pharmacy,
        user::UserRole,
    },
    services::catalog::CatalogService,
    AppState,
};

/// Catalog of the caller's own pharmacy.
async fn own_catalog(state: &AppState, user: &AuthenticatedUser) -> ApiResult<(Pharmacy, TenantCatalog)> {
    require_role(user, &[UserRole::Pharmacie])?;
    TenantCatalog::resolve_owned(&state.db, user.user_id).await
}

pub async fn list(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<CatalogQuery>,
) -> ApiResult<Json<Value>> {
    let (_, catalog) = own_catalog(&state, &user).await?;
    Ok(ok(CatalogService::list(&state.db, &catalog, &query).await?))
}

pub async fn get(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let (_, catalog) = own_catalog(&state, &user).await?;
    Ok(ok(CatalogService::get(&state.db, &catalog, id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateMedicamentRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (_, catalog) = own_catalog(&state, &user).await?;
    let med = CatalogService::create(&state.db, &catalog, &body).await?;
    Ok((StatusCode::CREATED, ok(med)))
}

pub async fn update(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateMedicamentRequest>,
) -> ApiResult<Json<Value>> {
    let (pharmacy, catalog) = own_catalog(&state, &user).await?;
    let med = CatalogService::update(&state.db, &state.notifier, &pharmacy, &catalog, id, &body).await?;
    Ok(ok(med))
}

pub async fn adjust_stock(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<AdjustStockRequest>,
) -> ApiResult<Json<Value>> {
    let (pharmacy, catalog) = own_catalog(&state, &user).await?;
    let med =
        CatalogService::adjust_stock(&state.db, &state.notifier, &pharmacy, &catalog, id, body.delta).await?;
    Ok(ok(med))
}

pub async fn delete(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let (_, catalog) = own_catalog(&state, &user).await?;
    CatalogService::delete(&state.db, &catalog, id).await?;
    Ok(ok_message("Médicament supprimé"))
}
