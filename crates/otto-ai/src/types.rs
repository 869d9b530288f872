use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One completion request: the system instruction resolved by the composer
/// plus the raw user text. The model is part of backend configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_instruction: String,
    pub user_text: String,
}

/// Enumerates supported `GenerationError` values.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("missing API key")]
    MissingApiKey,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("backend returned an empty reply")]
    EmptyReply,
}

/// One stage of the reply-generation fallback chain.
///
/// The composer iterates an ordered list of these; any error advances the
/// chain, so implementations report failures rather than degrading
/// internally.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError>;
}
