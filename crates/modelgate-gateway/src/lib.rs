//! OpenAI-compatible HTTP surface over the model pool.
//!
//! One axum router: chat completions (plain or SSE streaming), model listing
//! and refresh, health/status/capabilities, permissive CORS, and an
//! immediate-reject concurrency cap.

mod context;
mod convert;
mod error;
mod handlers;
mod pipeline;
mod rounds;
mod router;
mod server;
mod stream;
mod validate;
mod wire;

pub use error::{ApiError, GatewayError};
pub use server::GatewayServer;
