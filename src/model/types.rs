use serde::{Deserialize, Serialize};

/// Body of `POST /api/chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
    /// Values <= 0 start a new conversation with no history.
    #[serde(default)]
    pub conversation_id: i64,
    #[serde(default = "default_enable_thinking")]
    pub enable_thinking: bool,
    pub max_new_tokens: Option<usize>,
    pub temperature: Option<f32>,
    /// Image attachments belong to a vision-model pipeline this service
    /// does not ship; requests carrying them are rejected up front.
    #[serde(default)]
    pub images: Vec<String>,
}

fn default_enable_thinking() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One prior turn of a conversation, as handed to the chat template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// One frame of the generation event stream.
///
/// Frames are produced in strict order and the stream carries exactly one
/// terminal frame (`Done` or `Error`), always last.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Thinking {
        content: String,
    },
    ThinkingComplete {
        content: String,
    },
    Response {
        content: String,
    },
    ResponseComplete {
        content: String,
    },
    Done,
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
}

impl StreamEvent {
    /// SSE event name for this frame.
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::Thinking { .. } => "thinking",
            StreamEvent::ThinkingComplete { .. } => "thinking_complete",
            StreamEvent::Response { .. } => "response",
            StreamEvent::ResponseComplete { .. } => "response_complete",
            StreamEvent::Done => "done",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }
}
