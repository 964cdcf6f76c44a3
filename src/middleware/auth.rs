use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::{
    error::ApiError,
    models::{
        auth::{AuthenticatedUser, Claims},
        user::UserRole,
    },
};

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("En-tête Authorization manquant".into()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Format d'en-tête Authorization invalide".into()))?;

        let secret = parts
            .extensions
            .get::<JwtSecret>()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("JWT secret extension missing")))?;

        decode_access_token(token, &secret.0)
            .map_err(|_| ApiError::Unauthorized("Jeton invalide ou expiré".into()))
    }
}

/// Extension type to carry the JWT secret through request extensions.
#[derive(Clone)]
pub struct JwtSecret(pub String);

pub fn decode_access_token(token: &str, secret: &str) -> Result<AuthenticatedUser, anyhow::Error> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let data = decode::<Claims>(token, &key, &validation)?;
    let claims = data.claims;

    Ok(AuthenticatedUser {
        user_id: claims.sub.parse()?,
        role: claims.role,
    })
}

/// Rejects callers whose role is not in `allowed`.
pub fn require_role(user: &AuthenticatedUser, allowed: &[UserRole]) -> Result<(), ApiError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}

pub fn require_admin(user: &AuthenticatedUser) -> Result<(), ApiError> {
    require_role(user, &[UserRole::Admin])
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    fn token(role: UserRole, exp_offset: i64, secret: &str) -> (Uuid, String) {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: id.to_string(),
            role,
            iat: now as usize,
            exp: (now + exp_offset) as usize,
        };
        let t = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        (id, t)
    }

    #[test]
    fn valid_token_yields_user_and_role() {
        let (id, t) = token(UserRole::Pharmacie, 3600, "s3cret");
        let user = decode_access_token(&t, "s3cret").unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.role, UserRole::Pharmacie);
    }

    #[test]
    fn wrong_secret_and_expired_tokens_are_refused() {
        let (_, t) = token(UserRole::Client, 3600, "s3cret");
        assert!(decode_access_token(&t, "other").is_err());

        let (_, expired) = token(UserRole::Client, -3600, "s3cret");
        assert!(decode_access_token(&expired, "s3cret").is_err());
    }

    #[test]
    fn role_guard() {
        let client = AuthenticatedUser { user_id: Uuid::new_v4(), role: UserRole::Client };
        assert!(require_role(&client, &[UserRole::Client, UserRole::Admin]).is_ok());
        assert!(require_admin(&client).is_err());
    }
}
