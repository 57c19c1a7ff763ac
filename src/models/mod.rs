//! Text-generation backends.

mod openai;
mod replicate;

use std::time::Duration;

use crate::prompt::{PromptFormat, RenderedPrompt};

pub use openai::OpenAiChatBackend;
pub use replicate::ReplicateBackend;

/// Sampling settings for one target model.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("credential not set: {0}")]
    MissingCredential(String),

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("prediction not finished (status={0})")]
    Incomplete(String),

    #[error("prediction failed: {0}")]
    PredictionFailed(String),

    #[error("backend expects {expected:?} prompts")]
    FormatMismatch { expected: PromptFormat },
}

impl DispatchError {
    /// Whether repeating the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) | Self::Incomplete(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::MissingCredential(_)
            | Self::MalformedResponse(_)
            | Self::PredictionFailed(_)
            | Self::FormatMismatch { .. } => false,
        }
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

pub trait TextBackend {
    /// Short label used in logs and report headers.
    fn name(&self) -> &str;

    fn format(&self) -> PromptFormat;

    /// Issue exactly one request and return the generated text.
    fn generate(
        &self,
        prompt: &RenderedPrompt,
        cfg: &GenerationConfig,
    ) -> Result<String, DispatchError>;
}

/// A fresh blocking client per call. `None` keeps reqwest's default timeout.
fn http_client(timeout: Option<Duration>) -> Result<reqwest::blocking::Client, DispatchError> {
    let mut builder = reqwest::blocking::Client::builder();
    if let Some(t) = timeout {
        builder = builder.timeout(t);
    }
    Ok(builder.build()?)
}

/// An unset or blank variable is [`DispatchError::MissingCredential`].
fn read_credential(env_var: &str) -> Result<String, DispatchError> {
    std::env::var(env_var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DispatchError::MissingCredential(env_var.to_string()))
}

const ERROR_BODY_MAX_CHARS: usize = 400;

fn error_status(status: reqwest::StatusCode, body: &str) -> DispatchError {
    DispatchError::Status {
        status: status.as_u16(),
        body: body.chars().take(ERROR_BODY_MAX_CHARS).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(DispatchError::Timeout.is_retryable());
        assert!(DispatchError::Transport("reset".into()).is_retryable());
        assert!(DispatchError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(DispatchError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!DispatchError::Status { status: 401, body: String::new() }.is_retryable());
        assert!(!DispatchError::MalformedResponse("x".into()).is_retryable());
        assert!(!DispatchError::MissingCredential("KEY".into()).is_retryable());
    }

    #[test]
    fn error_body_is_truncated() {
        let body = "e".repeat(1000);
        match error_status(reqwest::StatusCode::BAD_REQUEST, &body) {
            DispatchError::Status { status, body } => {
                assert_eq!(status, 400);
                assert_eq!(body.len(), ERROR_BODY_MAX_CHARS);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn blank_credential_counts_as_missing() {
        std::env::set_var("FEWSHOT_FORMALIZER_TEST_BLANK_KEY", "   ");
        match read_credential("FEWSHOT_FORMALIZER_TEST_BLANK_KEY") {
            Err(DispatchError::MissingCredential(var)) => {
                assert_eq!(var, "FEWSHOT_FORMALIZER_TEST_BLANK_KEY")
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(read_credential("FEWSHOT_FORMALIZER_TEST_UNSET_KEY").is_err());

        std::env::set_var("FEWSHOT_FORMALIZER_TEST_PADDED_KEY", "  sk-123 \n");
        assert_eq!(
            read_credential("FEWSHOT_FORMALIZER_TEST_PADDED_KEY").expect("key"),
            "sk-123"
        );
    }
}
