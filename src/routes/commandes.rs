use axum::{extract::State, http::StatusCode};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{ok, ApiResult},
    extract::{Json, Path, Query},
    middleware::auth::require_role,
    models::{
        auth::AuthenticatedUser,
        commande::{CommandeQuery, CreateCommandeRequest, UpdateStatusRequest},
        user::UserRole,
    },
    services::commandes::CommandeService,
    AppState,
};

pub async fn create(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateCommandeRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    require_role(&user, &[UserRole::Client])?;
    let commande = CommandeService::create(&state.db, &state.notifier, user.user_id, &body).await?;
    Ok((StatusCode::CREATED, ok(commande)))
}

/// Orders visible to the caller: own orders for clients, received orders for
/// pharmacies, everything for admins.
pub async fn list(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<CommandeQuery>,
) -> ApiResult<Json<Value>> {
    let commandes = match user.role {
        UserRole::Client => CommandeService::list_for_client(&state.db, user.user_id, &query).await?,
        UserRole::Pharmacie => CommandeService::list_for_pharmacy(&state.db, user.user_id, &query).await?,
        UserRole::Admin => CommandeService::list_all(&state.db, &query).await?,
    };
    Ok(ok(commandes))
}

pub async fn get(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    Ok(ok(CommandeService::get(&state.db, &user, id).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateStatusRequest>,
) -> ApiResult<Json<Value>> {
    let commande =
        CommandeService::update_status(&state.db, &state.notifier, &user, id, body.status).await?;
    Ok(ok(commande))
}
