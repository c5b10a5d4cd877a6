pub mod openai;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use thiserror::Error;

use crate::error::Result;
use crate::gateway::GatewayEndpoint;

pub use openai::{ChatCompletionRequest, OpenAIClient};

/// Read failure on a response body
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BodyError(pub String);

/// Response body as it arrives off the wire
pub type ByteStream = BoxStream<'static, std::result::Result<Bytes, BodyError>>;

/// Status plus unread body of a chat-completions call
pub struct ChatResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl ChatResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body as text. Read errors end the body early.
    pub async fn text(mut self) -> String {
        let mut raw = Vec::new();
        while let Some(Ok(chunk)) = self.body.next().await {
            raw.extend_from_slice(&chunk);
        }
        String::from_utf8_lossy(&raw).into_owned()
    }
}

/// HTTP seam for `POST {base}/v1/chat/completions`.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn post_chat(
        &self,
        endpoint: &GatewayEndpoint,
        request: &ChatCompletionRequest,
    ) -> Result<ChatResponse>;
}
