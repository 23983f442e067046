pub mod backend;
mod handle;
mod traits;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{HfChatTokenizer, THINKING_END_TOKEN_ID};
pub use handle::ModelHandle;
pub use traits::{ChatTokenizer, LanguageModel};
pub use types::{ChatMessage, ChatRequest, Role, StreamEvent};
