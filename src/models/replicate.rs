use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{error_status, http_client, read_credential, DispatchError, GenerationConfig, TextBackend};
use crate::prompt::{PromptFormat, RenderedPrompt};

/// Replicate predictions API for a Llama 3 instruct model fed a pre-flattened prompt.
pub struct ReplicateBackend {
    name: String,
    base_url: String,
    api_token: String,
    timeout: Option<Duration>,
}

impl ReplicateBackend {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_token: api_token.into(),
            timeout: None,
        }
    }

    /// Fails with [`DispatchError::MissingCredential`] when `env_var` is unset or blank.
    pub fn from_env(name: &str, base_url: &str, env_var: &str) -> Result<Self, DispatchError> {
        read_credential(env_var).map(|token| Self::new(name, base_url, token))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}/predictions",
            self.base_url.trim_end_matches('/'),
            model.trim_matches('/')
        )
    }
}

#[derive(Serialize)]
struct PredictionRequest<'a> {
    input: PredictionInput<'a>,
}

#[derive(Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
    // The prompt is already in the model's chat format; stop Replicate from wrapping it again.
    prompt_template: &'static str,
    max_new_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct PredictionResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    output: Option<PredictionOutput>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PredictionOutput {
    Fragments(Vec<String>),
    Whole(String),
}

fn parse_prediction(body: &str) -> Result<String, DispatchError> {
    let resp: PredictionResponse =
        serde_json::from_str(body).map_err(|e| DispatchError::MalformedResponse(e.to_string()))?;
    let status = resp.status.unwrap_or_default();
    match status.as_str() {
        "failed" | "canceled" => {
            let msg = match resp.error {
                Some(serde_json::Value::String(s)) => s,
                Some(v) => v.to_string(),
                None => status,
            };
            return Err(DispatchError::PredictionFailed(msg));
        }
        "succeeded" => {}
        _ => return Err(DispatchError::Incomplete(status)),
    }
    match resp.output {
        Some(PredictionOutput::Fragments(parts)) => Ok(parts.concat()),
        Some(PredictionOutput::Whole(s)) => Ok(s),
        None => Err(DispatchError::MalformedResponse("no output".to_string())),
    }
}

impl TextBackend for ReplicateBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> PromptFormat {
        PromptFormat::Flat
    }

    fn generate(
        &self,
        prompt: &RenderedPrompt,
        cfg: &GenerationConfig,
    ) -> Result<String, DispatchError> {
        let RenderedPrompt::Text(text) = prompt else {
            return Err(DispatchError::FormatMismatch {
                expected: PromptFormat::Flat,
            });
        };
        let request = PredictionRequest {
            input: PredictionInput {
                prompt: text,
                prompt_template: "{prompt}",
                max_new_tokens: cfg.max_tokens,
                temperature: cfg.temperature,
                top_p: cfg.top_p,
            },
        };

        let client = http_client(self.timeout)?;
        let response = client
            .post(self.endpoint(&cfg.model))
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&request)
            .send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(error_status(status, &body));
        }
        parse_prediction(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_streamed_fragments() {
        let body = r#"{"id":"p1","status":"succeeded","output":["theo","rem\n  shows", " \"x\""],"error":null}"#;
        assert_eq!(parse_prediction(body).expect("parse"), "theorem\n  shows \"x\"");
    }

    #[test]
    fn accepts_single_string_output() {
        let body = r#"{"status":"succeeded","output":"done"}"#;
        assert_eq!(parse_prediction(body).expect("parse"), "done");
    }

    #[test]
    fn unfinished_and_failed_predictions() {
        let err = parse_prediction(r#"{"status":"processing","output":null}"#).expect_err("busy");
        assert!(matches!(err, DispatchError::Incomplete(ref s) if s == "processing"));
        assert!(err.is_retryable());

        let err = parse_prediction(r#"{"status":"failed","error":"CUDA OOM"}"#).expect_err("failed");
        assert!(matches!(err, DispatchError::PredictionFailed(ref s) if s == "CUDA OOM"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn request_disables_server_side_template() {
        let req = PredictionRequest {
            input: PredictionInput {
                prompt: "<|begin_of_text|>",
                prompt_template: "{prompt}",
                max_new_tokens: 64,
                temperature: 0.5,
                top_p: 0.9,
            },
        };
        let v = serde_json::to_value(&req).expect("json");
        assert_eq!(v["input"]["prompt_template"], "{prompt}");
        assert_eq!(v["input"]["max_new_tokens"], 64);
    }

    #[test]
    fn endpoint_uses_model_path() {
        let backend = ReplicateBackend::new("flat", "https://api.replicate.com/v1", "t");
        assert_eq!(
            backend.endpoint("meta/meta-llama-3-70b-instruct"),
            "https://api.replicate.com/v1/models/meta/meta-llama-3-70b-instruct/predictions"
        );
    }
}
