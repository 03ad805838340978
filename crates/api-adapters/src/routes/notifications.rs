use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use domains::Notification;
use services::{PageRequest, Paged, UnreadCount};

use crate::auth::AuthUser;
use crate::dto::UpdatedCount;
use crate::error::ApiResult;
use crate::extract::{ApiQuery, IdPath};
use crate::server::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/{id}/read", post(mark_read))
}

async fn list(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<Json<Paged<Notification>>> {
    Ok(Json(state.services.notifications.list(&actor, page).await?))
}

async fn unread_count(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> ApiResult<Json<UnreadCount>> {
    Ok(Json(state.services.notifications.unread_count(&actor).await?))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<Notification>> {
    Ok(Json(state.services.notifications.mark_read(&actor, id).await?))
}

async fn mark_all_read(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
) -> ApiResult<Json<UpdatedCount>> {
    let updated = state.services.notifications.mark_all_read(&actor).await?;
    Ok(Json(UpdatedCount { updated }))
}
