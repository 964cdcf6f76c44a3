pub mod admin;
pub mod auth;
pub mod cart;
pub mod client;
pub mod commandes;
pub mod health;
pub mod medicaments;
pub mod notifications;
pub mod pharmacies;
pub mod push;
pub mod users;
pub mod websocket;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{middleware::auth::JwtSecret, AppState};

/// Every HTTP route of the API. Layers are added by [`with_layers`].
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        // Auth
        .route("/auth/register", post(auth::register_client))
        .route("/auth/register-pharmacie", post(auth::register_pharmacy))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/auth/resend-verification", post(auth::resend_verification))
        .route("/auth/login", post(auth::login))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        // Current user
        .route("/users/me", get(users::me).put(users::update_profile))
        .route("/users/me/password", put(users::change_password))
        // Pharmacies (public listing + owner profile)
        .route("/pharmacies", get(pharmacies::list))
        .route("/pharmacies/me", get(pharmacies::mine))
        .route("/pharmacies/me/modification", post(pharmacies::request_modification))
        .route("/pharmacies/me/suppression", post(pharmacies::request_deletion))
        .route("/pharmacies/me/garde", put(pharmacies::set_garde).delete(pharmacies::clear_garde))
        .route("/pharmacies/{id}", get(pharmacies::get))
        .route("/pharmacies/{id}/medicaments", get(pharmacies::catalog))
        .route("/pharmacies/{id}/medicaments/{medicament_id}", get(pharmacies::medicament))
        // Owner catalog
        .route("/medicaments", get(medicaments::list).post(medicaments::create))
        .route(
            "/medicaments/{id}",
            get(medicaments::get).put(medicaments::update).delete(medicaments::delete),
        )
        .route("/medicaments/{id}/stock", patch(medicaments::adjust_stock))
        // Client
        .route("/client/search", get(client::search))
        .route("/client/alertes", get(client::list_alerts).post(client::subscribe_alert))
        .route(
            "/client/alertes/{pharmacy_id}/{medicament_id}",
            delete(client::unsubscribe_alert),
        )
        // Cart
        .route("/cart", get(cart::list))
        .route("/cart/items", post(cart::add_item))
        .route("/cart/{pharmacy_id}", get(cart::get).delete(cart::clear))
        .route(
            "/cart/{pharmacy_id}/items/{medicament_id}",
            put(cart::update_item).delete(cart::remove_item),
        )
        .route("/cart/{pharmacy_id}/checkout", post(cart::checkout))
        // Orders
        .route("/commandes", get(commandes::list).post(commandes::create))
        .route("/commandes/{id}", get(commandes::get))
        .route("/commandes/{id}/status", put(commandes::update_status))
        // Notifications
        .route("/notifications", get(notifications::list))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", put(notifications::mark_all_read))
        .route("/notifications/{id}", delete(notifications::delete))
        .route("/notifications/{id}/read", put(notifications::mark_read))
        // Push
        .route("/push/register", post(push::register))
        .route("/push/unregister", post(push::unregister))
        // Admin
        .route("/admin/demandes", get(admin::list_demandes))
        .route("/admin/demandes/{id}/approve", post(admin::approve_demande))
        .route("/admin/demandes/{id}/reject", post(admin::reject_demande))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{id}/active", put(admin::set_user_active))
        .route("/admin/users/{id}/verify-email", post(admin::verify_user_email))
        .route("/admin/pharmacies", get(admin::list_pharmacies))
        .route("/admin/commandes", get(admin::list_commandes))
        // Real-time
        .route("/ws", get(websocket::ws_handler))
}

/// JWT secret extension, request tracing, CORS and the body size limit.
pub fn with_layers<S>(router: Router<S>, app_base_url: &str, jwt_secret: JwtSecret) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    // Allow the web app origin; localhost is always allowed for development.
    let base_url = app_base_url.trim_end_matches('/').to_string();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| match origin.to_str() {
        Ok(o) => o == base_url || o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1"),
        Err(_) => false,
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(cors_origin);

    router
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024))
}
