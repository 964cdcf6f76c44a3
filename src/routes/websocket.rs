use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::ApiError,
    extract::Query,
    middleware::auth::decode_access_token,
    models::{auth::AuthenticatedUser, user::UserRole},
    services::realtime::Channel,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    pub token: String,
}

/// GET /ws?token=. Browsers cannot set headers on the upgrade request, so the
/// access token travels in the query string.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
) -> Result<Response, ApiError> {
    let user = decode_access_token(&params.token, &state.config.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("Jeton invalide ou expiré".into()))?;
    let channels = channels_for(&state, &user).await?;

    Ok(ws.on_upgrade(move |socket| async move {
        info!(user_id = %user.user_id, role = %user.role, "WebSocket connected");
        handle_socket(socket, state, user.user_id, channels).await;
    }))
}

/// Every user hears its own channel; pharmacy owners also hear their
/// pharmacy, admins the admin channel.
async fn channels_for(state: &AppState, user: &AuthenticatedUser) -> Result<Vec<Channel>, ApiError> {
    let mut channels = vec![Channel::User(user.user_id)];
    match user.role {
        UserRole::Pharmacie => {
            let pharmacy: Option<Uuid> = sqlx::query_scalar("SELECT id FROM pharmacies WHERE owner_id = $1")
                .bind(user.user_id)
                .fetch_optional(&state.db)
                .await?;
            channels.extend(pharmacy.map(Channel::Pharmacy));
        }
        UserRole::Admin => channels.push(Channel::Admins),
        UserRole::Client => {}
    }
    Ok(channels)
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid, channels: Vec<Channel>) {
    let (mut sender, mut receiver) = socket.split();

    let mut events = match state.notifier.events.subscribe(channels).await {
        Ok(s) => s,
        Err(e) => {
            error!("Event bus subscribe error: {e:#}");
            return;
        }
    };

    // Event bus → WebSocket
    let mut bus_task = tokio::spawn(async move {
        while let Some(payload) = events.next().await {
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // The client only keeps the connection alive; anything it sends is ignored.
    let mut client_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(%user_id, "WebSocket receive error: {e}");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut bus_task) => client_task.abort(),
        _ = (&mut client_task) => bus_task.abort(),
    }

    info!(%user_id, "WebSocket disconnected");
}
