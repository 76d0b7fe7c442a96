use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use modelgate_llm::ModelSource;
use modelgate_pool::ModelPool;

use crate::error::ApiError;
use crate::pipeline::handle_chat;
use crate::server::AppState;
use crate::wire::{ChatCompletionRequest, ModelEntry, ModelList, unix_now};

pub(crate) async fn chat_completions_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let req: ChatCompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::validation(format!("invalid request body: {e}")))?;
    handle_chat(&state, req).await
}

pub(crate) async fn models_handler(State(state): State<AppState>) -> Json<ModelList> {
    let pool = state.manager.snapshot();
    let created = pool
        .updated_at
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let data = pool
        .iter_all()
        .map(|caps| ModelEntry {
            id: caps.id.clone(),
            object: "model",
            created,
            owned_by: caps.vendor.clone(),
        })
        .collect();
    Json(ModelList {
        object: "list",
        data,
    })
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pool = state.manager.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "uptime_seconds": state.metrics.uptime_seconds(),
        "models": pool.len(),
        "tiers": tier_json(&pool),
    }))
}

pub(crate) async fn status_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pool = state.manager.snapshot();
    let metrics = state.metrics_rx.borrow().clone();
    let tools: Vec<serde_json::Value> = state
        .registry
        .usage_stats()
        .into_iter()
        .map(|(name, usage)| {
            serde_json::json!({
                "name": name,
                "calls": usage.calls,
                "errors": usage.errors,
            })
        })
        .collect();

    Json(serde_json::json!({
        "status": "ok",
        "uptime_seconds": state.metrics.uptime_seconds(),
        "requests": {
            "total": metrics.requests_total,
            "failed": metrics.requests_failed,
            "streaming": metrics.streaming_requests,
        },
        "tokens": {
            "prompt": metrics.prompt_tokens,
            "completion": metrics.completion_tokens,
        },
        "last_latency_ms": metrics.last_latency_ms,
        "pool": {
            "total": pool.len(),
            "tiers": tier_json(&pool),
        },
        "tools": tools,
        "tool_timeout_secs": state.tool_timeout.as_secs(),
    }))
}

pub(crate) async fn refresh_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let count = state
        .manager
        .refresh()
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    tracing::info!(models = count, "manual pool refresh");
    Ok(Json(serde_json::json!({ "models": count })))
}

pub(crate) async fn capabilities_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pool = state.manager.snapshot();
    let vision = pool.iter_all().filter(|c| c.supports_vision).count();
    let tools = pool.iter_all().filter(|c| c.supports_tools).count();
    let streaming = pool.iter_all().filter(|c| c.supports_streaming).count();
    Json(serde_json::json!({
        "vendor": state.manager.source().vendor(),
        "features": {
            "streaming": true,
            "vision": vision > 0,
            "tools": tools > 0,
        },
        "models": {
            "total": pool.len(),
            "vision_capable": vision,
            "tool_capable": tools,
            "streaming_capable": streaming,
        },
        "tiers": tier_json(&pool),
        "updated_at": unix_now(),
    }))
}

fn tier_json(pool: &ModelPool) -> serde_json::Value {
    let mut tiers = serde_json::Map::new();
    for (tier, count) in pool.tier_counts() {
        let name = serde_json::to_value(tier)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        tiers.insert(name, serde_json::Value::from(count));
    }
    serde_json::Value::Object(tiers)
}

pub(crate) async fn not_found_handler() -> Response {
    ApiError::NotFound("unknown endpoint".into()).into_response()
}
