//! Backend model abstraction and upstream implementations.
//!
//! A backend model is an opaque capability: identity and limit getters plus
//! "send an ordered message list, get back a cancellable event stream". Nothing
//! above this crate depends on how the upstream is actually reached.

pub mod any;
pub mod backend;
pub mod error;
pub mod http;
pub mod message;
#[cfg(feature = "mock")]
pub mod mock;
pub mod sse;
pub mod upstream;

pub use any::{AnyBackend, AnySource};
pub use backend::{ChatStream, ModelBackend, ModelSource, SendOptions, StreamEvent, ToolSpec};
pub use error::BackendError;
pub use message::{ChatMessage, ContentPart, Role, ToolCallRequest};
