use axum::extract::State;
use serde_json::Value;

use crate::{
    error::{ok, ok_message, ApiResult},
    extract::Json,
    models::{
        auth::AuthenticatedUser,
        user::{ChangePasswordRequest, UpdateProfileRequest},
    },
    services::auth::AuthService,
    AppState,
};

pub async fn me(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult<Json<Value>> {
    Ok(ok(AuthService::me(&state.db, user.user_id).await?))
}

pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateProfileRequest>,
) -> ApiResult<Json<Value>> {
    Ok(ok(AuthService::update_profile(&state.db, user.user_id, &body).await?))
}

pub async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> ApiResult<Json<Value>> {
    AuthService::change_password(&state.db, user.user_id, &body.current_password, &body.new_password)
        .await?;
    Ok(ok_message("Mot de passe modifié"))
}
