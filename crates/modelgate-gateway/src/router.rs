use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::error::ApiError;
use crate::handlers::{
    capabilities_handler, chat_completions_handler, health_handler, models_handler,
    not_found_handler, refresh_handler, status_handler,
};
use crate::server::AppState;

pub(crate) fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    // The concurrency cap guards the model-facing routes only; health and
    // status must stay reachable when the gateway is saturated.
    let capped = Router::new()
        .route("/v1/chat/completions", post(chat_completions_handler))
        .route("/v1/models", get(models_handler))
        .route("/v1/models/refresh", post(refresh_handler))
        .route("/v1/capabilities", get(capabilities_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            concurrency_cap_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(max_body_bytes));

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .merge(capped)
        .fallback(not_found_handler)
        .layer(middleware::from_fn(options_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        )
        .with_state(state)
}

/// `OPTIONS` on any path answers 200 with no body, before routing.
async fn options_middleware(req: Request<Body>, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    next.run(req).await
}

/// Immediate 429 when the cap is exhausted; requests are never queued. Runs
/// before body parsing and validation.
async fn concurrency_cap_middleware(
    axum::extract::State(state): axum::extract::State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Ok(permit) = Arc::clone(&state.limiter).try_acquire_owned() else {
        return ApiError::RateLimited.into_response();
    };
    let response = next.run(req).await;
    drop(permit);
    response
}
