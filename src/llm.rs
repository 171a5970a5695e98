//! OpenAI-compatible chat completion client.
//!
//! Used for response synthesis (`llm.provider = "openai"`), QA pair
//! generation and judging. Works with any endpoint that speaks the
//! `/v1/chat/completions` protocol. The key is read from `OPENAI_API_KEY`
//! when the client is built.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{RagError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Llm(e.to_string()))?;
        let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/chat/completions", base)
    }

    /// Send a chat completion request and return the first choice's text.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RagError::Llm(format!("request failed: {}", e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RagError::Llm(format!("reading response failed: {}", e)))?;

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                return Err(RagError::Llm(format!(
                    "API error ({}): {}",
                    status, api_error.error.message
                )));
            }
            return Err(RagError::Llm(format!("Request failed ({}): {}", status, body)));
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::Llm(format!("invalid completion body: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RagError::Llm("No choices in response".to_string()))
    }

    /// Single user message with an optional system prompt.
    pub async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        let mut messages = Vec::new();
        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(user));
        self.chat(messages).await
    }
}

/// Pull a JSON object or array out of an LLM reply that may wrap it in a
/// code fence or prose.
pub fn extract_json(response: &str) -> &str {
    let response = response.trim();

    if let Some(rest) = response.strip_prefix("```") {
        let body = match rest.find('\n') {
            Some(nl) => &rest[nl + 1..],
            None => rest,
        };
        if let Some(end) = body.rfind("```") {
            return body[..end].trim();
        }
    }

    let open = response.find(['{', '[']);
    let close = response.rfind(['}', ']']);
    match (open, close) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ChatStub;

    fn client(api_base: &str) -> LlmClient {
        LlmClient::new(LlmConfig {
            api_base: api_base.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(
            client("https://api.example.com/").endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            client("https://api.example.com").endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn message_roles_serialize_lowercase() {
        let json = serde_json::to_value(Message::system("be brief")).unwrap();
        assert_eq!(json["role"], "system");
    }

    #[test]
    fn extract_json_from_fence() {
        let reply = "```json\n{\"score\": 7}\n```";
        assert_eq!(extract_json(reply), "{\"score\": 7}");
    }

    #[test]
    fn extract_json_from_prose() {
        let reply = "Sure! Here it is: [{\"q\": 1}] Hope that helps.";
        assert_eq!(extract_json(reply), "[{\"q\": 1}]");
        assert_eq!(extract_json("no json"), "no json");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_llm_error() {
        let c = client("http://127.0.0.1:9");
        let err = c.complete(None, "hi").await.unwrap_err();
        assert!(matches!(err, RagError::Llm(_)));
    }

    #[tokio::test]
    async fn chat_returns_first_choice_and_sends_config() {
        let stub = ChatStub::start(&["Paris."]).await;
        let llm = LlmClient::new(stub.llm_config()).unwrap();

        let reply = llm
            .complete(Some("Answer tersely."), "Capital of France?")
            .await
            .unwrap();
        assert_eq!(reply, "Paris.");

        let requests = stub.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0]["model"], "stub-model");
        assert_eq!(requests[0]["temperature"], 0.0);
        let messages = requests[0]["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "Answer tersely.");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "Capital of France?");
    }
}
