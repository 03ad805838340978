use axum::extract::State;
use axum::routing::patch;
use axum::{Json, Router};

use domains::Comment;

use super::detached;
use crate::auth::AuthUser;
use crate::dto::ContentRequest;
use crate::error::ApiResult;
use crate::extract::{ApiJson, IdPath};
use crate::server::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new().route("/comments/{id}", patch(update).delete(remove))
}

async fn update(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<ContentRequest>,
) -> ApiResult<Json<Comment>> {
    let comments = state.services.comments.clone();
    let comment = detached(async move { comments.update(&actor, id, body.content).await }).await?;
    Ok(Json(comment))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<Comment>> {
    let comments = state.services.comments.clone();
    let comment = detached(async move { comments.delete(&actor, id).await }).await?;
    Ok(Json(comment))
}
