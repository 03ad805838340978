//! Router assembly: shared state, the middleware stack, the operational
//! endpoints and static media.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::extract::State;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{BoxError, Json, Router};
use prometheus_client::registry::Registry;
use serde::Serialize;
use tower::limit::ConcurrencyLimitLayer;
use tower::timeout::error::Elapsed;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::warn;

use services::AppServices;
use storage_adapters::RoomHub;

use crate::error::ApiError;
use crate::routes;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub services: AppServices,
    pub hub: Arc<RoomHub>,
    pub registry: Arc<Registry>,
}

impl AppState {
    pub fn new(services: AppServices, hub: Arc<RoomHub>, registry: Registry) -> Self {
        Self {
            services,
            hub,
            registry: Arc::new(registry),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub request_timeout: Duration,
    pub concurrency_limit: usize,
    /// Any origin when `None`
    pub cors_origin: Option<String>,
    pub media: Option<MediaMount>,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            concurrency_limit: 1024,
            cors_origin: None,
            media: None,
        }
    }
}

/// Serves the local media directory under the URL prefix the media store
/// hands out.
#[derive(Debug, Clone)]
pub struct MediaMount {
    pub url_prefix: String,
    pub root: PathBuf,
}

/// Builds the full application: `/api/*`, `/healthz`, `/metrics` and the
/// media mount when configured.
pub fn build_router(state: AppState, settings: &RouterSettings) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id))
        .layer(cors_layer(settings.cors_origin.as_deref()))
        .layer(CompressionLayer::new())
        .layer(HandleErrorLayer::new(handle_middleware_error))
        .layer(TimeoutLayer::new(settings.request_timeout))
        .layer(ConcurrencyLimitLayer::new(settings.concurrency_limit));

    let mut router = Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .nest("/api", routes::api_router());
    if let Some(media) = &settings.media {
        let prefix = media.url_prefix.trim_end_matches('/');
        if prefix.starts_with('/') && prefix.len() > 1 {
            router = router.nest_service(prefix, ServeDir::new(&media.root));
        } else {
            warn!(prefix = %media.url_prefix, "media prefix must be a non-root path; not serving media");
        }
    }
    router.layer(middleware).with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)])
        .max_age(Duration::from_secs(3600));

    match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => cors.allow_origin(origin),
        Some(Err(_)) => {
            warn!("cors origin is not a valid header value; allowing any origin");
            cors.allow_origin(Any)
        }
        None => cors.allow_origin(Any),
    }
}

async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        ApiError::new(StatusCode::REQUEST_TIMEOUT, "TIMEOUT", "Request timed out")
    } else {
        ApiError::internal(format!("unhandled middleware error: {err}"))
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.hub.connection_count(),
    })
}

async fn metrics(State(state): State<AppState>) -> Response {
    let mut body = String::new();
    match prometheus_client::encoding::text::encode(&mut body, &state.registry) {
        Ok(()) => (
            [(
                header::CONTENT_TYPE,
                "application/openmetrics-text; version=1.0.0; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(err) => ApiError::internal(format!("metrics encoding failed: {err}")).into_response(),
    }
}
