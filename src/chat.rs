use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Prefix of every reply that reports a failure instead of an answer.
pub const WARNING_MARKER: &str = "⚠️";

pub const UNAVAILABLE_NOTICE: &str =
    "⚠️ Error: AI chat functionality is not available. Model failed to load.";

pub const CHAT_GREETING: &str = "Welcome! Ask your question about civic education below.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
    SystemError,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::User => "You",
            Speaker::Assistant => "Gemini",
            Speaker::SystemError => "Gemini",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub message: String,
}

impl ChatTurn {
    pub fn user(message: impl Into<String>) -> Self {
        ChatTurn {
            speaker: Speaker::User,
            message: message.into(),
        }
    }

    /// Classify a reply from [`ChatBridge::ask`].
    pub fn from_reply(reply: String) -> Self {
        let speaker = if reply.starts_with(WARNING_MARKER) {
            Speaker::SystemError
        } else {
            Speaker::Assistant
        };
        ChatTurn { speaker, message: reply }
    }
}

/// Display log for the chat panel. Turns are never sent back to the model.
#[derive(Debug, Clone, Default)]
pub struct ChatLog {
    greeting: Option<String>,
    turns: Vec<ChatTurn>,
}

impl ChatLog {
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        ChatLog {
            greeting: Some(greeting.into()),
            turns: Vec::new(),
        }
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    pub fn greeting(&self) -> Option<&str> {
        self.greeting.as_deref()
    }

    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }
}

/// One stateless request to a remote assistant.
pub trait ChatTransport: Send + Sync {
    fn send<'a>(&'a self, message: &'a str) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}

/// Boundary between the UI and the remote assistant. `ask` always yields
/// displayable text.
#[derive(Clone)]
pub struct ChatBridge {
    transport: Option<Arc<dyn ChatTransport>>,
}

impl ChatBridge {
    pub fn ready(transport: Arc<dyn ChatTransport>) -> Self {
        ChatBridge {
            transport: Some(transport),
        }
    }

    pub fn unavailable() -> Self {
        ChatBridge { transport: None }
    }

    pub fn is_ready(&self) -> bool {
        self.transport.is_some()
    }

    pub async fn ask(&self, message: &str) -> String {
        let Some(transport) = &self.transport else {
            return UNAVAILABLE_NOTICE.to_string();
        };

        match transport.send(message).await {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                tracing::error!("Gemini API call failed: {:#}", e);
                format!("{} Error: {}", WARNING_MARKER, e)
            }
        }
    }
}

impl std::fmt::Debug for ChatBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatBridge")
            .field("ready", &self.is_ready())
            .finish()
    }
}
