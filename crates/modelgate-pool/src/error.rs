use modelgate_llm::BackendError;

/// Pool-level failures. A discovery pass only fails as a whole when the
/// upstream listing does; per-model probe anomalies are logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("upstream model listing failed: {0}")]
    Listing(#[from] BackendError),
}
