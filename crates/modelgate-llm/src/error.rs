#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("permission denied by upstream")]
    PermissionDenied,

    #[error("content blocked by upstream policy")]
    ContentBlocked,

    #[error("model not found: {model}")]
    NotFound { model: String },

    #[error("context too long: {tokens} tokens exceeds limit {limit}")]
    ContextTooLong { tokens: usize, limit: usize },

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("upstream unreachable")]
    Unreachable,

    #[error("empty response from {model}")]
    EmptyResponse { model: String },

    #[error("SSE parse error: {0}")]
    SseParse(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;
