use crate::error::ServiceError;
use crate::model::ChatMessage;

/// Forward pass of the served model.
///
/// Implementations take the full token sequence generated so far and return
/// next-position logits over the vocabulary. The call is treated as
/// side-effect free; any internal device state is the implementation's
/// problem to serialize.
pub trait LanguageModel: Send + Sync {
    fn forward(&self, tokens: &[u32]) -> Result<Vec<f32>, ServiceError>;
}

/// Tokenizer collaborator for prompt construction and incremental decoding.
pub trait ChatTokenizer: Send + Sync {
    /// Apply the chat template over prior turns plus the new user prompt and
    /// encode the result, including the generation prefix for the assistant
    /// turn. When thinking is disabled the template closes the think block
    /// up front so the model skips straight to the answer.
    fn render_prompt(
        &self,
        history: &[ChatMessage],
        prompt: &str,
        enable_thinking: bool,
    ) -> Result<Vec<u32>, ServiceError>;

    /// Decode the whole accumulated sequence. Callers re-decode from scratch
    /// on every emission; partial sequences only resolve correctly with full
    /// left context.
    fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String, ServiceError>;

    fn eos_token_id(&self) -> u32;

    /// Reserved marker closing the thinking segment.
    fn thinking_end_token_id(&self) -> u32;
}
