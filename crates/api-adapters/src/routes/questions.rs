use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use domains::{Answer, Question};
use services::{NewAnswer, NewQuestion, PageRequest, Paged};

use super::detached;
use crate::auth::AuthUser;
use crate::dto::{AskQuestionRequest, ListQuestionsParams, PostAnswerRequest, UpdateQuestionRequest};
use crate::error::ApiResult;
use crate::extract::{ApiJson, ApiQuery, IdPath};
use crate::server::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/questions", get(list).post(ask))
        .route("/questions/{id}", get(show).patch(update).delete(remove))
        .route("/questions/{id}/answers", get(list_answers).post(post_answer))
}

async fn list(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<ListQuestionsParams>,
) -> ApiResult<Json<Paged<Question>>> {
    Ok(Json(state.services.questions.list(params.into()).await?))
}

async fn ask(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    ApiJson(body): ApiJson<AskQuestionRequest>,
) -> ApiResult<(StatusCode, Json<Question>)> {
    let input = NewQuestion::try_from(body)?;
    let questions = state.services.questions.clone();
    let question = detached(async move { questions.ask(&actor, input).await }).await?;
    Ok((StatusCode::CREATED, Json(question)))
}

async fn show(State(state): State<AppState>, IdPath(id): IdPath) -> ApiResult<Json<Question>> {
    Ok(Json(state.services.questions.get(id).await?))
}

async fn update(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<UpdateQuestionRequest>,
) -> ApiResult<Json<Question>> {
    let questions = state.services.questions.clone();
    let question = detached(async move { questions.update(&actor, id, body.into()).await }).await?;
    Ok(Json(question))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
) -> ApiResult<Json<Question>> {
    let questions = state.services.questions.clone();
    let question = detached(async move { questions.delete(&actor, id).await }).await?;
    Ok(Json(question))
}

async fn list_answers(
    State(state): State<AppState>,
    IdPath(id): IdPath,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<Json<Paged<Answer>>> {
    Ok(Json(state.services.answers.list(id, page).await?))
}

async fn post_answer(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    IdPath(id): IdPath,
    ApiJson(body): ApiJson<PostAnswerRequest>,
) -> ApiResult<(StatusCode, Json<Answer>)> {
    let input = NewAnswer::try_from(body)?;
    let answers = state.services.answers.clone();
    let answer = detached(async move { answers.post(&actor, id, input).await }).await?;
    Ok((StatusCode::CREATED, Json(answer)))
}
