//! Moderation endpoints. Every handler requires an admin token; the role
//! check itself lives in `ModerationService`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};

use domains::{Answer, Comment, Notification, Question, UserProfile};
use services::{PageRequest, Paged};

use super::detached;
use crate::auth::AuthUser;
use crate::dto::{ContentRequest, RoleRequest, StatusRequest};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiQuery, IdPath};
use crate::server::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/questions/{id}/status", patch(set_question_status))
        .route("/answers/{id}", delete(delete_answer))
        .route("/comments/{id}", delete(delete_comment))
        .route("/users", get(list_users))
        .route("/users/{id}/role", patch(set_role))
        .route("/announcements", post(announce))
}

async fn set_question_status(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<StatusRequest>,
) -> ApiResult<Json<Question>> {
    let moderation = state.services.moderation.clone();
    let question =
        detached(async move { moderation.set_question_status(&actor, id, body.status).await })
            .await?;
    Ok(Json(question))
}

async fn delete_answer(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<Answer>> {
    let moderation = state.services.moderation.clone();
    let answer = detached(async move { moderation.delete_answer(&actor, id).await }).await?;
    Ok(Json(answer))
}

async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<Comment>> {
    let moderation = state.services.moderation.clone();
    let comment = detached(async move { moderation.delete_comment(&actor, id).await }).await?;
    Ok(Json(comment))
}

async fn list_users(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<Json<Paged<UserProfile>>> {
    Ok(Json(state.services.moderation.list_users(&actor, page).await?))
}

async fn set_role(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<RoleRequest>,
) -> ApiResult<Json<UserProfile>> {
    let moderation = state.services.moderation.clone();
    let profile = detached(async move { moderation.set_role(&actor, id, body.role).await }).await?;
    Ok(Json(profile))
}

async fn announce(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiJson(body): ApiJson<ContentRequest>,
) -> ApiResult<(StatusCode, Json<Notification>)> {
    let moderation = state.services.moderation.clone();
    let notification =
        detached(async move { moderation.announce(&actor, body.content).await }).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}
