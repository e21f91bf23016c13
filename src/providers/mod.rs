//! AI provider integration

mod gemini;

use async_trait::async_trait;
use thiserror::Error;

use crate::conversation::AiPayload;

pub use gemini::GeminiResponder;

#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("provider returned an error: {0}")]
    Api(String),

    #[error("provider response was not a valid payload: {0}")]
    InvalidPayload(String),

    #[error("provider returned no advice")]
    EmptyAdvice,
}

/// The medical-guidance model behind a send.
///
/// An implementation must never return a payload with empty `advice`; an
/// answer without advice counts as a failure even when the call itself
/// succeeded.
#[async_trait]
pub trait AiResponder: Send + Sync {
    async fn respond(
        &self,
        symptoms: &str,
        image_url: Option<&str>,
    ) -> Result<AiPayload, ResponderError>;
}
