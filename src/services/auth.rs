use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    db::tenant::{is_valid_slug, slugify},
    error::{is_unique_violation, ApiError, ApiResult},
    models::{
        auth::Claims,
        demande::DemandeKind,
        notification::{NewNotification, NotificationKind},
        pharmacy::Pharmacy,
        user::{
            LoginResponse, RegisterClientRequest, RegisterPharmacyRequest, UpdateProfileRequest,
            User, UserProfile, UserRole, USER_COLS,
        },
    },
    services::{
        email::EmailService,
        metrics::LOGINS_COUNTER,
        notifications::{self, Notifier},
    },
};

const MIN_PASSWORD_LEN: usize = 8;
const BCRYPT_COST: u32 = 12;
const VERIFY_TTL_HOURS: i64 = 24;
const RESET_TTL_HOURS: i64 = 1;

/// Purpose column of `email_tokens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Verify,
    Reset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Verify => "verify",
            TokenPurpose::Reset => "reset",
        }
    }

    fn ttl(&self) -> chrono::Duration {
        match self {
            TokenPurpose::Verify => chrono::Duration::hours(VERIFY_TTL_HOURS),
            TokenPurpose::Reset => chrono::Duration::hours(RESET_TTL_HOURS),
        }
    }
}

/// Random 48-char alphanumeric token sent by email.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}

/// Only the SHA-256 of a token is stored.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> ApiResult<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    };
    if !valid || email.contains(char::is_whitespace) {
        return Err(ApiError::bad_request("Adresse email invalide"));
    }
    Ok(())
}

fn validate_password(password: &str) -> ApiResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Le mot de passe doit contenir au moins {MIN_PASSWORD_LEN} caractères"
        )));
    }
    Ok(())
}

fn required_field(value: &str, label: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("Le champ {label} est requis")));
    }
    Ok(())
}

pub struct AuthService;

impl AuthService {
    pub fn generate_access_token(
        user_id: Uuid,
        role: UserRole,
        secret: &str,
        ttl_seconds: u64,
    ) -> anyhow::Result<String> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: now,
            exp: now + ttl_seconds as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub async fn register_client(
        pool: &PgPool,
        email_svc: Option<&EmailService>,
        req: &RegisterClientRequest,
    ) -> ApiResult<UserProfile> {
        let email = normalize_email(&req.email);
        validate_email(&email)?;
        validate_password(&req.password)?;
        required_field(&req.first_name, "prénom")?;
        required_field(&req.last_name, "nom")?;

        let mut tx = pool.begin().await?;
        let user = insert_user(
            &mut tx,
            &email,
            &req.password,
            req.first_name.trim(),
            req.last_name.trim(),
            req.phone.as_deref(),
            req.address.as_deref(),
            UserRole::Client,
        )
        .await?;
        let token = issue_email_token(&mut tx, user.id, TokenPurpose::Verify).await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, "client registered");
        send_verification(email_svc, &user, &token).await;
        Ok(user.into())
    }

    /// Create the pharmacy-role account, its pending pharmacy and the
    /// `creation_pharmacie` demande. Admins are notified.
    pub async fn register_pharmacy(
        pool: &PgPool,
        notifier: &Notifier,
        email_svc: Option<&EmailService>,
        req: &RegisterPharmacyRequest,
    ) -> ApiResult<(UserProfile, Pharmacy)> {
        let email = normalize_email(&req.email);
        validate_email(&email)?;
        validate_password(&req.password)?;
        required_field(&req.first_name, "prénom")?;
        required_field(&req.last_name, "nom")?;
        required_field(&req.pharmacy_name, "nom de la pharmacie")?;
        required_field(&req.pharmacy_address, "adresse")?;
        required_field(&req.city, "ville")?;

        let base_slug = slugify(&req.pharmacy_name);
        if !is_valid_slug(&base_slug) {
            return Err(ApiError::bad_request("Nom de pharmacie invalide"));
        }

        let mut tx = pool.begin().await?;
        let user = insert_user(
            &mut tx,
            &email,
            &req.password,
            req.first_name.trim(),
            req.last_name.trim(),
            req.phone.as_deref(),
            None,
            UserRole::Pharmacie,
        )
        .await?;

        let slug = unique_slug(&mut tx, &base_slug).await?;
        let pharmacy = sqlx::query_as::<_, Pharmacy>(
            "INSERT INTO pharmacies
                (owner_id, slug, name, address, city, phone, opening_hours, delivery_available)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *",
        )
        .bind(user.id)
        .bind(&slug)
        .bind(req.pharmacy_name.trim())
        .bind(req.pharmacy_address.trim())
        .bind(req.city.trim())
        .bind(&req.pharmacy_phone)
        .bind(&req.opening_hours)
        .bind(req.delivery_available)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO demandes (requester_id, pharmacy_id, kind, payload)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user.id)
        .bind(pharmacy.id)
        .bind(DemandeKind::CreationPharmacie.as_str())
        .bind(serde_json::json!({ "name": pharmacy.name, "city": pharmacy.city }))
        .execute(&mut *tx)
        .await?;

        let admins = notifications::admin_ids(&mut *tx).await?;
        let pending: Vec<NewNotification> = admins
            .into_iter()
            .map(|admin| NewNotification {
                recipient_id: admin,
                commande_id: None,
                kind: NotificationKind::Demande,
                title: "Nouvelle pharmacie à valider".to_string(),
                message: format!("{} ({}) demande son inscription.", pharmacy.name, pharmacy.city),
            })
            .collect();
        let created = notifications::create_many(&mut tx, &pending).await?;

        let token = issue_email_token(&mut tx, user.id, TokenPurpose::Verify).await?;
        tx.commit().await?;

        tracing::info!(user_id = %user.id, pharmacy_id = %pharmacy.id, slug = %slug, "pharmacy registered, awaiting approval");
        notifier.dispatch(pool, &created);
        send_verification(email_svc, &user, &token).await;
        Ok((user.into(), pharmacy))
    }

    pub async fn verify_email(pool: &PgPool, token: &str) -> ApiResult<()> {
        let mut tx = pool.begin().await?;
        let user_id = consume_email_token(&mut tx, token, TokenPurpose::Verify)
            .await?
            .ok_or_else(|| ApiError::bad_request("Lien de vérification invalide ou expiré"))?;
        sqlx::query("UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!(%user_id, "email verified");
        Ok(())
    }

    /// Always succeeds so the response does not reveal whether the account exists.
    pub async fn resend_verification(
        pool: &PgPool,
        email_svc: Option<&EmailService>,
        email: &str,
    ) -> anyhow::Result<()> {
        let Some(user) = find_by_email(pool, &normalize_email(email)).await? else {
            return Ok(());
        };
        if user.email_verified || !user.is_active {
            return Ok(());
        }
        let mut conn = pool.acquire().await?;
        let token = issue_email_token(&mut conn, user.id, TokenPurpose::Verify).await?;
        send_verification(email_svc, &user, &token).await;
        Ok(())
    }

    pub async fn login(
        pool: &PgPool,
        jwt_secret: &str,
        ttl_seconds: u64,
        email: &str,
        password: &str,
    ) -> ApiResult<LoginResponse> {
        let invalid = || ApiError::Unauthorized("Identifiants invalides".into());

        let user = match find_by_email(pool, &normalize_email(email)).await? {
            Some(u) => u,
            None => {
                LOGINS_COUNTER.with_label_values(&["unknown"]).inc();
                return Err(invalid());
            }
        };

        let valid = bcrypt::verify(password, &user.password_hash).unwrap_or(false);
        if !valid {
            LOGINS_COUNTER.with_label_values(&["bad_password"]).inc();
            return Err(invalid());
        }
        if !user.is_active {
            LOGINS_COUNTER.with_label_values(&["inactive"]).inc();
            return Err(ApiError::Forbidden("Ce compte est désactivé".into()));
        }
        if !user.email_verified {
            LOGINS_COUNTER.with_label_values(&["unverified"]).inc();
            return Err(ApiError::Forbidden(
                "Veuillez confirmer votre adresse email avant de vous connecter".into(),
            ));
        }

        let role: UserRole = user.role.parse()?;
        let access_token = Self::generate_access_token(user.id, role, jwt_secret, ttl_seconds)?;
        LOGINS_COUNTER.with_label_values(&["success"]).inc();
        tracing::info!(user_id = %user.id, role = %role, "login");

        Ok(LoginResponse {
            access_token,
            expires_in: ttl_seconds,
            user: user.into(),
        })
    }

    /// Send a password reset email. Always returns Ok to avoid leaking account existence.
    pub async fn forgot_password(
        pool: &PgPool,
        email_svc: Option<&EmailService>,
        email: &str,
    ) -> anyhow::Result<()> {
        let Some(user) = find_by_email(pool, &normalize_email(email)).await? else {
            return Ok(());
        };
        if !user.is_active {
            return Ok(());
        }

        let mut conn = pool.acquire().await?;
        let token = issue_email_token(&mut conn, user.id, TokenPurpose::Reset).await?;

        if let Some(svc) = email_svc {
            let name = format!("{} {}", user.first_name, user.last_name);
            if let Err(e) = svc.send_password_reset(&user.email, &name, &token).await {
                tracing::warn!(user_id = %user.id, "password reset email failed: {e:#}");
            }
        }
        Ok(())
    }

    pub async fn reset_password(pool: &PgPool, token: &str, new_password: &str) -> ApiResult<()> {
        validate_password(new_password)?;

        let mut tx = pool.begin().await?;
        let user_id = consume_email_token(&mut tx, token, TokenPurpose::Reset)
            .await?
            .ok_or_else(|| ApiError::bad_request("Token invalide ou expiré"))?;

        let password_hash = bcrypt::hash(new_password, BCRYPT_COST).map_err(anyhow::Error::from)?;
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(&password_hash)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        // Any other outstanding reset link dies with this one.
        sqlx::query("UPDATE email_tokens SET used = TRUE WHERE user_id = $1 AND purpose = 'reset'")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(%user_id, "password reset");
        Ok(())
    }

    pub async fn change_password(
        pool: &PgPool,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
    ) -> ApiResult<()> {
        validate_password(new_password)?;

        let password_hash: String =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1 AND is_active = TRUE")
                .bind(user_id)
                .fetch_optional(pool)
                .await?
                .ok_or_else(|| ApiError::not_found("Utilisateur"))?;

        if !bcrypt::verify(current_password, &password_hash).unwrap_or(false) {
            return Err(ApiError::bad_request("Mot de passe actuel incorrect"));
        }

        let new_hash = bcrypt::hash(new_password, BCRYPT_COST).map_err(anyhow::Error::from)?;
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
            .bind(&new_hash)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn me(pool: &PgPool, user_id: Uuid) -> ApiResult<UserProfile> {
        let user = find_by_id(pool, user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Utilisateur"))?;
        Ok(user.into())
    }

    pub async fn update_profile(
        pool: &PgPool,
        user_id: Uuid,
        req: &UpdateProfileRequest,
    ) -> ApiResult<UserProfile> {
        for (value, label) in [(&req.first_name, "prénom"), (&req.last_name, "nom")] {
            if let Some(v) = value {
                required_field(v, label)?;
            }
        }

        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET
               first_name = COALESCE($2, first_name),
               last_name  = COALESCE($3, last_name),
               phone      = COALESCE($4, phone),
               address    = COALESCE($5, address),
               updated_at = NOW()
             WHERE id = $1
             RETURNING {USER_COLS}"
        ))
        .bind(user_id)
        .bind(req.first_name.as_deref().map(str::trim))
        .bind(req.last_name.as_deref().map(str::trim))
        .bind(&req.phone)
        .bind(&req.address)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Utilisateur"))?;
        Ok(user.into())
    }

    /// Create the configured admin account if no user holds that email yet.
    pub async fn bootstrap_admin(pool: &PgPool, email: &str, password: &str) -> anyhow::Result<()> {
        let email = normalize_email(email);
        if find_by_email(pool, &email).await?.is_some() {
            return Ok(());
        }
        let password_hash = bcrypt::hash(password, BCRYPT_COST)?;
        sqlx::query(
            "INSERT INTO users (email, password_hash, first_name, last_name, role, email_verified)
             VALUES ($1, $2, 'Admin', 'Plateforme', 'admin', TRUE)
             ON CONFLICT (email) DO NOTHING",
        )
        .bind(&email)
        .bind(&password_hash)
        .execute(pool)
        .await?;
        tracing::info!(%email, "bootstrap admin created");
        Ok(())
    }
}

pub async fn find_by_email(pool: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE email = $1"))
        .bind(email)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

#[allow(clippy::too_many_arguments)]
async fn insert_user(
    conn: &mut PgConnection,
    email: &str,
    password: &str,
    first_name: &str,
    last_name: &str,
    phone: Option<&str>,
    address: Option<&str>,
    role: UserRole,
) -> ApiResult<User> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(email)
        .fetch_one(&mut *conn)
        .await?;
    if exists {
        return Err(ApiError::Conflict("Un compte existe déjà avec cette adresse email".into()));
    }

    let password_hash = bcrypt::hash(password, BCRYPT_COST).map_err(anyhow::Error::from)?;
    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (email, password_hash, first_name, last_name, phone, address, role)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {USER_COLS}"
    ))
    .bind(email)
    .bind(&password_hash)
    .bind(first_name)
    .bind(last_name)
    .bind(phone)
    .bind(address)
    .bind(role.as_str())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::Conflict("Un compte existe déjà avec cette adresse email".into())
        } else {
            e.into()
        }
    })?;
    Ok(user)
}

async fn unique_slug(conn: &mut PgConnection, base: &str) -> anyhow::Result<String> {
    let taken: Vec<String> = sqlx::query_scalar("SELECT slug FROM pharmacies WHERE slug = $1 OR slug LIKE $1 || '-%'")
        .bind(base)
        .fetch_all(&mut *conn)
        .await?;
    Ok(pick_slug(base, &taken))
}

/// First of `base`, `base-2`, `base-3`, ... not in `taken`.
fn pick_slug(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|s| s == base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Store a fresh token for `user_id` and return its clear text.
async fn issue_email_token(
    conn: &mut PgConnection,
    user_id: Uuid,
    purpose: TokenPurpose,
) -> anyhow::Result<String> {
    let token = generate_token();
    sqlx::query(
        "INSERT INTO email_tokens (user_id, purpose, token_hash, expires_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(user_id)
    .bind(purpose.as_str())
    .bind(hash_token(&token))
    .bind(Utc::now() + purpose.ttl())
    .execute(&mut *conn)
    .await?;
    Ok(token)
}

/// Mark the token used and return its user, if it is valid for `purpose`.
async fn consume_email_token(
    conn: &mut PgConnection,
    token: &str,
    purpose: TokenPurpose,
) -> anyhow::Result<Option<Uuid>> {
    let user_id = sqlx::query_scalar(
        "UPDATE email_tokens SET used = TRUE
         WHERE token_hash = $1 AND purpose = $2 AND used = FALSE AND expires_at > NOW()
         RETURNING user_id",
    )
    .bind(hash_token(token.trim()))
    .bind(purpose.as_str())
    .fetch_optional(&mut *conn)
    .await?;
    Ok(user_id)
}

async fn send_verification(email_svc: Option<&EmailService>, user: &User, token: &str) {
    let Some(svc) = email_svc else {
        tracing::debug!(user_id = %user.id, "SMTP disabled, verification email not sent");
        return;
    };
    let name = format!("{} {}", user.first_name, user.last_name);
    if let Err(e) = svc.send_verification(&user.email, &name, token).await {
        tracing::warn!(user_id = %user.id, "verification email failed: {e:#}");
    }
}
