use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{BodyError, ChatResponse, ChatTransport};
use crate::error::{ChatError, Result};
use crate::gateway::GatewayEndpoint;
use crate::state::ChatMessage;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Talks to an OpenAI-compatible chat gateway over reqwest.
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
}

impl Default for OpenAIClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAIClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatTransport for OpenAIClient {
    async fn post_chat(
        &self,
        endpoint: &GatewayEndpoint,
        request: &ChatCompletionRequest,
    ) -> Result<ChatResponse> {
        let url = endpoint.chat_completions_url();
        debug!(%url, messages = request.messages.len(), "posting chat completion");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map_err(|e| BodyError(e.to_string()))
            .boxed();

        Ok(ChatResponse { status, body })
    }
}

/// Human-readable message from a non-streaming error body.
///
/// Gateways answer `{"error": {"message": ...}}`; a bare `{"error": "..."}`
/// is accepted too. Anything else falls back to a generic message.
pub fn error_message(status: u16, body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|json| {
            json["error"]["message"]
                .as_str()
                .or_else(|| json["error"].as_str())
        })
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Gateway request failed with status {}", status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = ChatCompletionRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![ChatMessage::system("be brief"), ChatMessage::user("menu?")],
            temperature: 0.7,
            max_tokens: 500,
            stream: true,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "menu?");
        assert_eq!(json["max_tokens"], 500);
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn test_error_message_from_body() {
        let body = r#"{"error":{"message":"Model is overloaded","type":"server_error"}}"#;
        assert_eq!(error_message(503, body), "Model is overloaded");
        assert_eq!(error_message(400, r#"{"error":"bad request"}"#), "bad request");
    }

    #[test]
    fn test_error_message_fallback() {
        assert_eq!(
            error_message(502, "<html>Bad Gateway</html>"),
            "Gateway request failed with status 502"
        );
        assert_eq!(
            error_message(500, r#"{"error":{"message":"  "}}"#),
            "Gateway request failed with status 500"
        );
    }
}
