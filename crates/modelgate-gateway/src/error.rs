use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use modelgate_llm::BackendError;

/// Fatal server lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to bind {0}: {1}")]
    Bind(String, std::io::Error),

    #[error("server error: {0}")]
    Server(String),
}

/// Request-facing error taxonomy. Each variant maps to one status code and
/// one OpenAI-style error body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        param: Option<String>,
    },

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Permission(String),

    #[error("{0}")]
    NotFound(String),

    #[error("request timed out")]
    Timeout,

    #[error("too many concurrent requests")]
    RateLimited,

    #[error("no suitable model available")]
    NoSuitableModel,

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            param: None,
        }
    }

    pub fn validation_param(message: impl Into<String>, param: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            param: Some(param.into()),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Permission(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::NoSuitableModel => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "invalid_request_error",
            Self::Auth(_) => "authentication_error",
            Self::Permission(_) => "permission_error",
            Self::NotFound(_) => "not_found_error",
            Self::Timeout => "timeout_error",
            Self::RateLimited => "rate_limit_error",
            Self::Internal(_) => "internal_error",
            Self::Upstream(_) => "api_error",
            Self::NoSuitableModel => "service_unavailable_error",
        }
    }

    #[must_use]
    pub fn body(&self) -> serde_json::Value {
        let mut error = serde_json::json!({
            "message": self.to_string(),
            "type": self.kind(),
        });
        if let Self::Validation {
            param: Some(param), ..
        } = self
        {
            error["param"] = serde_json::Value::String(param.clone());
        }
        if let Some(code) = self.status().canonical_reason() {
            error["code"] = serde_json::Value::String(code.to_lowercase().replace(' ', "_"));
        }
        serde_json::json!({ "error": error })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Remap upstream typed errors into the request-facing taxonomy.
impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::PermissionDenied => {
                Self::Permission("permission denied by upstream".into())
            }
            BackendError::ContentBlocked => {
                Self::Permission("content blocked by upstream policy".into())
            }
            BackendError::NotFound { model } => Self::NotFound(format!("model not found: {model}")),
            BackendError::ContextTooLong { tokens, limit } => Self::validation(format!(
                "context too long: {tokens} tokens exceeds limit {limit}"
            )),
            BackendError::RateLimited => Self::RateLimited,
            other => Self::Upstream(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::validation("x").status(), 400);
        assert_eq!(ApiError::Auth("x".into()).status(), 401);
        assert_eq!(ApiError::Permission("x".into()).status(), 403);
        assert_eq!(ApiError::NotFound("x".into()).status(), 404);
        assert_eq!(ApiError::Timeout.status(), 408);
        assert_eq!(ApiError::RateLimited.status(), 429);
        assert_eq!(ApiError::Internal("x".into()).status(), 500);
        assert_eq!(ApiError::Upstream("x".into()).status(), 502);
        assert_eq!(ApiError::NoSuitableModel.status(), 503);
    }

    #[test]
    fn body_shape() {
        let body = ApiError::validation_param("bad field", "temperature").body();
        assert_eq!(body["error"]["message"], "bad field");
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["param"], "temperature");
    }

    #[test]
    fn permission_denied_remaps_to_403() {
        let err: ApiError = BackendError::PermissionDenied.into();
        assert_eq!(err.status(), 403);
        let err: ApiError = BackendError::ContentBlocked.into();
        assert_eq!(err.status(), 403);
    }

    #[test]
    fn context_too_long_remaps_to_400_with_numbers() {
        let err: ApiError = BackendError::ContextTooLong {
            tokens: 9000,
            limit: 8192,
        }
        .into();
        assert_eq!(err.status(), 400);
        let text = err.to_string();
        assert!(text.contains("9000") && text.contains("8192"));
    }

    #[test]
    fn unclassified_upstream_remaps_to_502() {
        let err: ApiError = BackendError::Unreachable.into();
        assert_eq!(err.status(), 502);
        assert_eq!(err.kind(), "api_error");
    }
}
