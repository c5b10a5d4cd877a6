pub mod actions;
pub mod ai;
pub mod config;
pub mod error;
pub mod gateway;
pub mod prompt;
pub mod session;
pub mod state;
pub mod stream;

// Re-export main types for convenience
pub use actions::{extract_actions, strip_actions, AssistantAction};
pub use ai::{ChatCompletionRequest, ChatResponse, ChatTransport, OpenAIClient};
pub use config::Config;
pub use error::{ChatError, Result, FALLBACK_MESSAGE};
pub use gateway::{GatewayEndpoint, GatewayLocator, HealthProbe, HttpHealthProbe, ProbeFailure};
pub use prompt::{default_system_prompt, PromptContext};
pub use session::{AssistantReply, ChatSession, SessionOptions};
pub use state::{ChatMessage, ChatRole};
pub use stream::{decode, DeltaStream, FinishReason, Frame, FrameDecoder, StreamEvent};

// Cancellation handle threaded through `ChatSession::send` and `decode`.
pub use tokio_util::sync::CancellationToken;
