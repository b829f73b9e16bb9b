use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeyscopeError>;

#[derive(Error, Debug)]
pub enum KeyscopeError {
    #[error("Malformed response from {provider}: {detail}")]
    MalformedResponse { provider: String, detail: String },

    #[error("Rate limit exhausted for {provider}")]
    RateLimited { provider: String },

    #[error("Timed out waiting for {provider}")]
    Timeout { provider: String },

    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    #[error("Credentials rejected by {provider}")]
    Auth { provider: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl KeyscopeError {
    /// Transient failures worth retrying with backoff. Everything else is
    /// either fatal for the provider (auth) or fatal for the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KeyscopeError::RateLimited { .. } | KeyscopeError::Timeout { .. }
        )
    }
}
