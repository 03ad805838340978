//! `/api` route table.

mod admin;
mod answers;
mod auth;
mod comments;
mod notifications;
mod questions;

use std::future::Future;

use axum::routing::get;
use axum::Router;
use tracing::error;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;
use crate::ws;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(questions::router())
        .merge(answers::router())
        .merge(comments::router())
        .merge(notifications::router())
        .nest("/admin", admin::router())
        .route("/ws", get(ws::upgrade))
}

/// Runs a mutating use case on its own task. A client that disconnects
/// mid-request drops this future, not the write and its fanout.
pub(crate) async fn detached<T, Fut>(work: Fut) -> ApiResult<T>
where
    Fut: Future<Output = domains::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(join) => {
            error!(error = %join, "request task did not complete");
            Err(ApiError::internal("Something went wrong. Please try again."))
        }
    }
}
