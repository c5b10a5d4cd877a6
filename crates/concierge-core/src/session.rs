//! Conversation sessions
//!
//! A [`ChatSession`] lives as long as one chat widget. It owns the message
//! history and drives each turn through the gateway locator, the transport
//! and the stream decoder. A turn that produces no assistant reply leaves the
//! history exactly as it found it.

use futures_util::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actions::{extract_actions, strip_actions, AssistantAction};
use crate::ai::openai::error_message;
use crate::ai::{ChatCompletionRequest, ChatTransport, OpenAIClient};
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::gateway::{GatewayEndpoint, GatewayLocator, HttpHealthProbe};
use crate::state::{ChatMessage, ChatRole};
use crate::stream::decode;

/// Per-request model parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub context_window: usize,
    pub system_prompt: String,
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            context_window: config.context_window.max(1),
            system_prompt: config.system_prompt(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&Config::new())
    }
}

/// A completed assistant turn
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    /// Reply with action tags removed
    pub text: String,
    pub actions: Vec<AssistantAction>,
    /// Gateway that served the reply
    pub gateway: GatewayEndpoint,
}

pub struct ChatSession {
    locator: Arc<GatewayLocator>,
    transport: Arc<dyn ChatTransport>,
    options: SessionOptions,
    history: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(
        locator: Arc<GatewayLocator>,
        transport: Arc<dyn ChatTransport>,
        options: SessionOptions,
    ) -> Self {
        Self {
            locator,
            transport,
            options,
            history: Vec::new(),
        }
    }

    /// Session backed by reqwest, with its own locator.
    pub fn from_config(config: &Config) -> Self {
        let locator = GatewayLocator::new(
            config.endpoints(),
            HttpHealthProbe::new(config.health_timeout()),
        );
        Self::new(
            Arc::new(locator),
            Arc::new(OpenAIClient::new()),
            SessionOptions::from(config),
        )
    }

    pub fn locator(&self) -> &Arc<GatewayLocator> {
        &self.locator
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Full history for display; tags are kept in assistant messages.
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// The most recent messages, as sent with the next request.
    pub fn context_window(&self) -> &[ChatMessage] {
        let start = self
            .history
            .len()
            .saturating_sub(self.options.context_window);
        &self.history[start..]
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Send one user turn and stream the reply.
    ///
    /// Each text delta is handed to `on_delta` as it arrives. On success the
    /// tag-inclusive reply is committed to history and the cleaned text plus
    /// actions are returned. On any failure, cancellation included, the user
    /// message is removed again; deltas already delivered are not retracted.
    pub async fn send<F>(
        &mut self,
        user_text: &str,
        cancel: &CancellationToken,
        on_delta: F,
    ) -> Result<AssistantReply>
    where
        F: FnMut(&str),
    {
        self.history.push(ChatMessage::user(user_text));

        match self.exchange(cancel, on_delta).await {
            Ok((full_text, gateway)) => {
                let actions = extract_actions(&full_text);
                let text = strip_actions(&full_text);
                info!(
                    gateway = gateway.base_url(),
                    chars = full_text.len(),
                    actions = actions.len(),
                    "assistant reply complete"
                );
                self.history.push(ChatMessage::assistant(full_text));
                Ok(AssistantReply {
                    text,
                    actions,
                    gateway,
                })
            }
            Err(err) => {
                self.rollback();
                if err.is_cancelled() {
                    debug!("chat turn cancelled");
                } else {
                    warn!(error = %err, "chat turn failed");
                }
                Err(err)
            }
        }
    }

    async fn exchange<F>(
        &self,
        cancel: &CancellationToken,
        mut on_delta: F,
    ) -> Result<(String, GatewayEndpoint)>
    where
        F: FnMut(&str),
    {
        let gateway = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            resolved = self.locator.resolve() => resolved?,
        };

        let request = self.build_request();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            response = self.transport.post_chat(&gateway, &request) => response?,
        };

        if !response.is_success() {
            let status = response.status;
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                body = response.text() => body,
            };
            return Err(ChatError::Gateway {
                status,
                message: error_message(status, &body),
            });
        }

        let mut deltas = decode(response.body, cancel.clone());
        let mut full_text = String::new();
        while let Some(delta) = deltas.next().await {
            let delta = delta?;
            on_delta(&delta);
            full_text.push_str(&delta);
        }

        if full_text.is_empty() {
            return Err(ChatError::Stream("no content received".to_string()));
        }
        Ok((full_text, gateway))
    }

    fn build_request(&self) -> ChatCompletionRequest {
        let window = self.context_window();
        let mut messages = Vec::with_capacity(window.len() + 1);
        messages.push(ChatMessage::system(self.options.system_prompt.as_str()));
        messages.extend_from_slice(window);

        ChatCompletionRequest {
            model: self.options.model.clone(),
            messages,
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
            stream: true,
        }
    }

    fn rollback(&mut self) {
        if matches!(self.history.last(), Some(m) if m.role == ChatRole::User) {
            self.history.pop();
            debug!(len = self.history.len(), "rolled back user message");
        }
    }
}
