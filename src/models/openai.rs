use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{error_status, http_client, read_credential, DispatchError, GenerationConfig, TextBackend};
use crate::prompt::{MessageTurn, PromptFormat, RenderedPrompt};

/// OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChatBackend {
    name: String,
    base_url: String,
    api_key: String,
    timeout: Option<Duration>,
}

impl OpenAiChatBackend {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: None,
        }
    }

    /// Fails with [`DispatchError::MissingCredential`] when `env_var` is unset or blank.
    pub fn from_env(name: &str, base_url: &str, env_var: &str) -> Result<Self, DispatchError> {
        read_credential(env_var).map(|key| Self::new(name, base_url, key))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [MessageTurn],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

fn parse_chat_response(body: &str) -> Result<String, DispatchError> {
    let resp: ChatResponse =
        serde_json::from_str(body).map_err(|e| DispatchError::MalformedResponse(e.to_string()))?;
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| DispatchError::MalformedResponse("no message content".to_string()))
}

impl TextBackend for OpenAiChatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> PromptFormat {
        PromptFormat::Chat
    }

    fn generate(
        &self,
        prompt: &RenderedPrompt,
        cfg: &GenerationConfig,
    ) -> Result<String, DispatchError> {
        let RenderedPrompt::Turns(turns) = prompt else {
            return Err(DispatchError::FormatMismatch {
                expected: PromptFormat::Chat,
            });
        };
        let request = ChatRequest {
            model: &cfg.model,
            messages: turns,
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            top_p: cfg.top_p,
        };

        let client = http_client(self.timeout)?;
        let response = client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(error_status(status, &body));
        }
        parse_chat_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Role;

    #[test]
    fn request_body_matches_chat_completions_schema() {
        let turns = vec![
            MessageTurn::new(Role::System, "sys"),
            MessageTurn::new(Role::User, "q"),
        ];
        let req = ChatRequest {
            model: "gpt-4o",
            messages: &turns,
            temperature: 0.0,
            max_tokens: 256,
            top_p: 1.0,
        };
        let v = serde_json::to_value(&req).expect("json");
        assert_eq!(v["model"], "gpt-4o");
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][1]["content"], "q");
        assert_eq!(v["max_tokens"], 256);
    }

    #[test]
    fn parses_first_choice() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"theorem\n  shows \"1 = 1\""}}]}"#;
        assert_eq!(
            parse_chat_response(body).expect("parse"),
            "theorem\n  shows \"1 = 1\""
        );
    }

    #[test]
    fn empty_choices_is_malformed() {
        assert!(matches!(
            parse_chat_response(r#"{"choices":[]}"#),
            Err(DispatchError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_chat_response("<html>"),
            Err(DispatchError::MalformedResponse(_))
        ));
    }

    #[test]
    fn rejects_flat_prompt_without_network() {
        let backend = OpenAiChatBackend::new("chat", "http://127.0.0.1:9", "k");
        let cfg = GenerationConfig {
            model: "m".into(),
            temperature: 0.0,
            max_tokens: 1,
            top_p: 1.0,
        };
        let err = backend
            .generate(&RenderedPrompt::Text("x".into()), &cfg)
            .expect_err("mismatch");
        assert!(matches!(err, DispatchError::FormatMismatch { .. }));
    }

    #[test]
    fn endpoint_joins_base_url() {
        let backend = OpenAiChatBackend::new("chat", "https://api.openai.com/v1/", "k");
        assert_eq!(backend.endpoint(), "https://api.openai.com/v1/chat/completions");
    }
}
