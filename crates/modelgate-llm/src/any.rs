#[cfg(feature = "mock")]
use crate::mock::{MockModel, MockSource};
use crate::backend::{ChatStream, ModelBackend, ModelSource, SendOptions};
use crate::error::BackendError;
use crate::message::ChatMessage;
use crate::upstream::{HttpModel, HttpSource};

/// Generates a match over all `AnyBackend` variants, binding the inner model
/// and evaluating the given closure for each arm.
macro_rules! delegate_backend {
    ($self:expr, |$m:ident| $expr:expr) => {
        match $self {
            AnyBackend::Http($m) => $expr,
            #[cfg(feature = "mock")]
            AnyBackend::Mock($m) => $expr,
        }
    };
}

macro_rules! delegate_source {
    ($self:expr, |$s:ident| $expr:expr) => {
        match $self {
            AnySource::Http($s) => $expr,
            #[cfg(feature = "mock")]
            AnySource::Mock($s) => $expr,
        }
    };
}

#[derive(Clone, Debug)]
pub enum AnyBackend {
    Http(HttpModel),
    #[cfg(feature = "mock")]
    Mock(MockModel),
}

impl ModelBackend for AnyBackend {
    fn id(&self) -> &str {
        delegate_backend!(self, |m| m.id())
    }

    fn vendor(&self) -> &str {
        delegate_backend!(self, |m| m.vendor())
    }

    fn max_input_tokens(&self) -> i64 {
        delegate_backend!(self, |m| m.max_input_tokens())
    }

    fn reported_max_output_tokens(&self) -> Option<u32> {
        delegate_backend!(self, |m| m.reported_max_output_tokens())
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        options: &SendOptions,
    ) -> Result<ChatStream, BackendError> {
        delegate_backend!(self, |m| m.send(messages, options).await)
    }

    async fn reachable(&self) -> bool {
        delegate_backend!(self, |m| m.reachable().await)
    }
}

#[derive(Debug)]
pub enum AnySource {
    Http(HttpSource),
    #[cfg(feature = "mock")]
    Mock(MockSource),
}

impl ModelSource for AnySource {
    type Backend = AnyBackend;

    async fn list_models(&self) -> Result<Vec<AnyBackend>, BackendError> {
        match self {
            Self::Http(s) => Ok(s
                .list_models()
                .await?
                .into_iter()
                .map(AnyBackend::Http)
                .collect()),
            #[cfg(feature = "mock")]
            Self::Mock(s) => Ok(s
                .list_models()
                .await?
                .into_iter()
                .map(AnyBackend::Mock)
                .collect()),
        }
    }

    async fn access_available(&self) -> bool {
        delegate_source!(self, |s| s.access_available().await)
    }

    fn vendor(&self) -> &str {
        delegate_source!(self, |s| s.vendor())
    }
}
