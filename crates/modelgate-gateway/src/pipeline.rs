//! Request orchestration: validate, route, convert, dispatch, translate.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::response::{IntoResponse, Response};
use modelgate_llm::{ModelBackend, ModelSource, SendOptions, ToolSpec};
use modelgate_pool::{ModelCapabilities, select};
use tokio_stream::StreamExt;

use crate::context::{RequestContext, estimate_tokens};
use crate::convert::convert_messages;
use crate::error::ApiError;
use crate::rounds::run_tool_rounds;
use crate::server::AppState;
use crate::stream::{sse_response, translate};
use crate::validate::validate;
use crate::wire::{
    AssistantMessage, ChatCompletion, ChatCompletionRequest, Choice, Usage, unix_now,
};

/// Run one chat-completion request end to end.
pub(crate) async fn handle_chat(
    state: &AppState,
    req: ChatCompletionRequest,
) -> Result<Response, ApiError> {
    state.metrics.update(|m| m.requests_total += 1);
    match run(state, req).await {
        Ok(response) => Ok(response),
        Err(e) => {
            state.metrics.update(|m| m.requests_failed += 1);
            Err(e)
        }
    }
}

async fn run(state: &AppState, req: ChatCompletionRequest) -> Result<Response, ApiError> {
    validate(&req)?;

    let mut ctx = RequestContext::build(&req);
    tracing::info!(
        request_id = %ctx.request_id,
        model = ctx.requested_model.as_deref().unwrap_or("auto"),
        stream = ctx.stream,
        estimated_tokens = ctx.estimated_tokens,
        "chat completion received"
    );

    let pool = state.manager.snapshot();
    let selected = select(&pool, &ctx.criteria()).ok_or(ApiError::NoSuitableModel)?;
    tracing::debug!(request_id = %ctx.request_id, selected = %selected.id, "model selected");

    // Selection used the cached pool; access is verified live.
    if !state.manager.source().access_available().await {
        return Err(ApiError::Auth(format!(
            "no reachable {} model: backend access unavailable",
            state.manager.source().vendor()
        )));
    }

    check_token_budget(&ctx, &selected)?;
    check_output_budget(&req, &selected)?;

    let messages = convert_messages(&req.messages, selected.supports_vision)?;
    let options = build_options(state, &req, &selected);
    ctx.selected = Some(selected.clone());

    let start = Instant::now();
    let upstream = match selected.handle.send(&messages, &options).await {
        Ok(stream) => stream,
        Err(e) => {
            state
                .manager
                .record_sample(&selected.id, elapsed_ms(start), false);
            return Err(e.into());
        }
    };

    let model_name = ctx
        .requested_model
        .clone()
        .unwrap_or_else(|| selected.id.clone());

    // Tool calls are resolved between model turns; only content comes out.
    let mut content_stream = run_tool_rounds(
        Arc::clone(&state.registry),
        state.tool_timeout,
        selected.clone(),
        options,
        messages,
        upstream,
        ctx.request_id.clone(),
    );

    if ctx.stream {
        state.metrics.update(|m| m.streaming_requests += 1);
        state
            .manager
            .record_sample(&selected.id, elapsed_ms(start), true);
        let frames = translate(&ctx.request_id, &model_name, content_stream);
        return Ok(sse_response(frames));
    }

    let mut content = String::new();
    while let Some(item) = content_stream.next().await {
        match item {
            Ok(fragment) => content.push_str(&fragment),
            Err(e) => {
                state
                    .manager
                    .record_sample(&selected.id, elapsed_ms(start), false);
                return Err(e.into());
            }
        }
    }
    let latency = elapsed_ms(start);
    state.manager.record_sample(&selected.id, latency, true);

    #[allow(clippy::cast_sign_loss)]
    let prompt_tokens = ctx.estimated_tokens.max(0) as u64;
    #[allow(clippy::cast_sign_loss)]
    let completion_tokens = estimate_tokens(&content).max(0) as u64;
    state.metrics.update(|m| {
        m.prompt_tokens += prompt_tokens;
        m.completion_tokens += completion_tokens;
        m.last_latency_ms = latency;
    });
    tracing::info!(
        request_id = %ctx.request_id,
        model = %selected.id,
        latency_ms = latency,
        completion_tokens,
        "chat completion finished"
    );

    let completion = ChatCompletion {
        id: format!("chatcmpl-{}", ctx.request_id),
        object: "chat.completion",
        created: unix_now(),
        model: model_name,
        choices: vec![Choice {
            index: 0,
            message: AssistantMessage {
                role: "assistant",
                content,
            },
            finish_reason: "stop",
        }],
        usage: Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        },
    };
    Ok(Json(completion).into_response())
}

/// Authoritative post-selection budget check against the selected model's
/// actual input limit, reporting both numbers.
fn check_token_budget(ctx: &RequestContext, selected: &ModelCapabilities) -> Result<(), ApiError> {
    if ctx.estimated_tokens > selected.max_input_tokens {
        return Err(ApiError::validation(format!(
            "estimated {} prompt tokens exceeds the {} token limit of model {}",
            ctx.estimated_tokens, selected.max_input_tokens, selected.id
        )));
    }
    Ok(())
}

fn check_output_budget(
    req: &ChatCompletionRequest,
    selected: &ModelCapabilities,
) -> Result<(), ApiError> {
    if let Some(max_tokens) = req.max_tokens
        && max_tokens > selected.max_output_tokens
    {
        return Err(ApiError::validation_param(
            format!(
                "max_tokens {max_tokens} exceeds the {} output limit of model {}",
                selected.max_output_tokens, selected.id
            ),
            "max_tokens",
        ));
    }
    Ok(())
}

/// Attach declared functions as upstream tool specs, keeping only the ones
/// with a registered handler.
fn build_options(
    state: &AppState,
    req: &ChatCompletionRequest,
    selected: &ModelCapabilities,
) -> SendOptions {
    let mut options = SendOptions {
        max_tokens: req.max_tokens,
        temperature: req.temperature,
        top_p: req.top_p,
        stop: req
            .stop
            .as_ref()
            .map(crate::wire::StopField::as_vec)
            .unwrap_or_default(),
        tools: Vec::new(),
    };
    if selected.supports_tools {
        for function in req.declared_functions() {
            if state.registry.is_registered(&function.name) {
                options.tools.push(ToolSpec {
                    name: function.name.clone(),
                    description: function.description.clone().unwrap_or_default(),
                    parameters: function
                        .parameters
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({})),
                });
            } else {
                tracing::warn!(
                    function = %function.name,
                    "dropping declared function without a registered handler"
                );
            }
        }
    }
    options
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
