use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use domains::UserProfile;
use services::{AuthSession, Registration};

use super::detached;
use crate::auth::AuthUser;
use crate::dto::LoginRequest;
use crate::error::ApiResult;
use crate::extract::ApiJson;
use crate::server::AppState;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}

async fn register(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<Registration>,
) -> ApiResult<(StatusCode, Json<AuthSession>)> {
    let users = state.services.users.clone();
    let session = detached(async move { users.register(input).await }).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<LoginRequest>,
) -> ApiResult<Json<AuthSession>> {
    let users = state.services.users.clone();
    let session =
        detached(async move { users.login(&input.identifier, &input.password).await }).await?;
    Ok(Json(session))
}

async fn me(State(state): State<AppState>, AuthUser(actor): AuthUser) -> ApiResult<Json<UserProfile>> {
    Ok(Json(state.services.users.me(&actor).await?))
}
