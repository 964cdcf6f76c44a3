use axum::extract::State;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    error::{ok, ok_message, ApiResult},
    extract::{Json, Path, Query},
    models::{auth::AuthenticatedUser, notification::NotificationQuery, PaginationQuery},
    services::notifications,
    AppState,
};

pub async fn list(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<Value>> {
    let page = PaginationQuery { page: query.page, per_page: query.per_page };
    let items =
        notifications::list(&state.db, user.user_id, query.unread, page.offset(), page.per_page()).await?;
    let unread = notifications::unread_count(&state.db, user.user_id).await?;
    Ok(ok(json!({ "notifications": items, "unread": unread })))
}

pub async fn unread_count(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult<Json<Value>> {
    let unread = notifications::unread_count(&state.db, user.user_id).await?;
    Ok(ok(json!({ "unread": unread })))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    Ok(ok(notifications::mark_read(&state.db, user.user_id, id).await?))
}

pub async fn mark_all_read(State(state): State<AppState>, user: AuthenticatedUser) -> ApiResult<Json<Value>> {
    let updated = notifications::mark_all_read(&state.db, user.user_id).await?;
    Ok(ok(json!({ "updated": updated })))
}

pub async fn delete(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    notifications::delete(&state.db, user.user_id, id).await?;
    Ok(ok_message("Notification supprimée"))
}
