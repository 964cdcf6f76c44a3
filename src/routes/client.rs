use axum::{extract::State, http::StatusCode};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{ok, ok_message, ApiResult},
    extract::{Json, Path, Query},
    middleware::auth::require_role,
    models::{
        auth::AuthenticatedUser,
        medicament::{SearchQuery, StockAlertRequest},
        user::UserRole,
    },
    services::{catalog::CatalogService, stock_alerts},
    AppState,
};

/// Medicament search across every approved pharmacy.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Value>> {
    Ok(ok(CatalogService::search_all(&state.db, &query.q).await?))
}

pub async fn list_alerts(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult<Json<Value>> {
    require_role(&user, &[UserRole::Client])?;
    Ok(ok(stock_alerts::list_for_user(&state.db, user.user_id).await?))
}

pub async fn subscribe_alert(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<StockAlertRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&user, &[UserRole::Client])?;
    stock_alerts::subscribe(&state.db, user.user_id, body.pharmacy_id, body.medicament_id).await?;
    Ok((StatusCode::CREATED, ok_message("Vous serez averti dès que ce médicament sera disponible")))
}

pub async fn unsubscribe_alert(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((pharmacy_id, medicament_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    require_role(&user, &[UserRole::Client])?;
    stock_alerts::unsubscribe(&state.db, user.user_id, pharmacy_id, medicament_id).await?;
    Ok(ok_message("Alerte supprimée"))
}
