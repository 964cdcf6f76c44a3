use axum::{extract::State, http::StatusCode};
use serde_json::{json, Value};

use crate::{
    error::{ok, ok_message, ApiResult},
    extract::Json,
    middleware::rate_limit::{check_rate_limit, login_key, reset_rate_limit, LOGIN_MAX_ATTEMPTS, LOGIN_WINDOW_SECS},
    models::{
        user::{
            EmailRequest, LoginRequest, RegisterClientRequest, RegisterPharmacyRequest,
            ResetPasswordRequest, TokenRequest,
        },
    },
    services::auth::AuthService,
    AppState,
};

pub async fn register_client(
    State(state): State<AppState>,
    Json(body): Json<RegisterClientRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let user = AuthService::register_client(&state.db, state.email.as_deref(), &body).await?;
    Ok((StatusCode::CREATED, ok(user)))
}

pub async fn register_pharmacy(
    State(state): State<AppState>,
    Json(body): Json<RegisterPharmacyRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let (user, pharmacy) =
        AuthService::register_pharmacy(&state.db, &state.notifier, state.email.as_deref(), &body).await?;
    Ok((StatusCode::CREATED, ok(json!({ "user": user, "pharmacy": pharmacy }))))
}

pub async fn verify_email(
    State(state): State<AppState>,
    Json(body): Json<TokenRequest>,
) -> ApiResult<Json<Value>> {
    AuthService::verify_email(&state.db, &body.token).await?;
    Ok(ok_message("Adresse email confirmée"))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> ApiResult<Json<Value>> {
    AuthService::resend_verification(&state.db, state.email.as_deref(), &body.email).await?;
    Ok(ok_message("Si ce compte existe et n'est pas vérifié, un email a été envoyé"))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<Value>> {
    // Rate limit: 5 attempts per 15 min per email
    let rate_key = login_key(&body.email);
    let mut redis = state.redis.clone();
    check_rate_limit(&mut redis, &rate_key, LOGIN_MAX_ATTEMPTS, LOGIN_WINDOW_SECS).await?;

    let response = AuthService::login(
        &state.db,
        &state.config.jwt_secret,
        state.config.jwt_expiry_seconds,
        &body.email,
        &body.password,
    )
    .await?;
    reset_rate_limit(&mut redis, &rate_key).await;
    Ok(ok(response))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<EmailRequest>,
) -> ApiResult<Json<Value>> {
    AuthService::forgot_password(&state.db, state.email.as_deref(), &body.email).await?;
    Ok(ok_message("Si ce compte existe, un email de réinitialisation a été envoyé"))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> ApiResult<Json<Value>> {
    AuthService::reset_password(&state.db, &body.token, &body.new_password).await?;
    Ok(ok_message("Mot de passe réinitialisé"))
}
