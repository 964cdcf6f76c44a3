use axum::{extract::State, http::StatusCode};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{ok, ok_message, ApiResult},
    extract::{Json, Path},
    middleware::auth::require_role,
    models::{
        auth::AuthenticatedUser,
        cart::{AddCartItemRequest, CheckoutRequest, UpdateCartItemRequest},
        user::UserRole,
    },
    services::cart::CartService,
    AppState,
};

fn client_only(user: &AuthenticatedUser) -> ApiResult<()> {
    require_role(user, &[UserRole::Client])
}

pub async fn list(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult<Json<Value>> {
    client_only(&user)?;
    Ok(ok(CartService::list_for_user(&state.db, user.user_id).await?))
}

pub async fn get(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(pharmacy_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    client_only(&user)?;
    Ok(ok(CartService::get(&state.db, user.user_id, pharmacy_id).await?))
}

pub async fn add_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<AddCartItemRequest>,
) -> ApiResult<Json<Value>> {
    client_only(&user)?;
    Ok(ok(CartService::add_item(&state.db, user.user_id, &body).await?))
}

pub async fn update_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((pharmacy_id, medicament_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateCartItemRequest>,
) -> ApiResult<Json<Value>> {
    client_only(&user)?;
    let cart =
        CartService::update_item(&state.db, user.user_id, pharmacy_id, medicament_id, body.quantity).await?;
    Ok(ok(cart))
}

pub async fn remove_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((pharmacy_id, medicament_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    client_only(&user)?;
    Ok(ok(CartService::remove_item(&state.db, user.user_id, pharmacy_id, medicament_id).await?))
}

pub async fn clear(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(pharmacy_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    client_only(&user)?;
    CartService::clear(&state.db, user.user_id, pharmacy_id).await?;
    Ok(ok_message("Panier vidé"))
}

pub async fn checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(pharmacy_id): Path<Uuid>,
    Json(body): Json<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    client_only(&user)?;
    let commande =
        CartService::checkout(&state.db, &state.notifier, user.user_id, pharmacy_id, &body).await?;
    Ok((StatusCode::CREATED, ok(commande)))
}
