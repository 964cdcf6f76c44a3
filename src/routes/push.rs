use axum::extract::State;
use serde_json::Value;

use crate::{
    error::{ok_message, ApiError, ApiResult},
    extract::Json,
    models::{
        auth::AuthenticatedUser,
        user::{RegisterPushTokenRequest, TokenRequest},
    },
    services::push::{register_push_token, unregister_push_token},
    AppState,
};

const PLATFORMS: [&str; 3] = ["web", "android", "ios"];

pub async fn register(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<RegisterPushTokenRequest>,
) -> ApiResult<Json<Value>> {
    if !PLATFORMS.contains(&body.platform.as_str()) {
        return Err(ApiError::bad_request("Plateforme inconnue (web, android ou ios)"));
    }
    if body.token.trim().is_empty() {
        return Err(ApiError::bad_request("Jeton push manquant"));
    }
    register_push_token(&state.db, user.user_id, &body.platform, body.token.trim()).await?;
    Ok(ok_message("Appareil enregistré"))
}

pub async fn unregister(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<TokenRequest>,
) -> ApiResult<Json<Value>> {
    if !unregister_push_token(&state.db, user.user_id, body.token.trim()).await? {
        return Err(ApiError::not_found("Appareil"));
    }
    Ok(ok_message("Appareil supprimé"))
}
