use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};

use domains::{Answer, Comment};
use services::{PageRequest, Paged, VoteTally};

use super::detached;
use crate::auth::AuthUser;
use crate::dto::{ContentRequest, VoteRequest};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiQuery, IdPath};
use crate::server::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/answers/{id}", patch(update).delete(remove))
        .route("/answers/{id}/accept", post(accept))
        .route("/answers/{id}/vote", post(vote))
        .route("/answers/{id}/comments", get(list_comments).post(post_comment))
}

async fn update(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<ContentRequest>,
) -> ApiResult<Json<Answer>> {
    let answers = state.services.answers.clone();
    let answer = detached(async move { answers.update(&actor, id, body.content).await }).await?;
    Ok(Json(answer))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<Answer>> {
    let answers = state.services.answers.clone();
    let answer = detached(async move { answers.delete(&actor, id).await }).await?;
    Ok(Json(answer))
}

async fn accept(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<Answer>> {
    let answers = state.services.answers.clone();
    let answer = detached(async move { answers.accept(&actor, id).await }).await?;
    Ok(Json(answer))
}

async fn vote(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<VoteRequest>,
) -> ApiResult<Json<VoteTally>> {
    let votes = state.services.votes.clone();
    let tally = detached(async move { votes.vote(&actor, id, body.vote_type).await }).await?;
    Ok(Json(tally))
}

async fn list_comments(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<Json<Paged<Comment>>> {
    Ok(Json(state.services.comments.list(id, page).await?))
}

async fn post_comment(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<ContentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let comments = state.services.comments.clone();
    let comment = detached(async move { comments.post(&actor, id, body.content).await }).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
