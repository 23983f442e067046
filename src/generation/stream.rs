//! The autoregressive generation loop.
//!
//! One `StreamingGenerator` owns one in-flight generation: it repeatedly runs
//! the model forward pass over the full token sequence, samples the next
//! token, watches for the thinking-end marker and EOS, and pushes
//! `StreamEvent`s into the caller's sink. The loop is synchronous; the
//! transport runs it on a blocking thread and forwards events as they land.

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::ServiceError;
use crate::generation::buffer::{DecodeBuffer, EmitCadence, Phase};
use crate::generation::sampler::{SamplingParams, sample};
use crate::model::{ChatMessage, ChatTokenizer, LanguageModel, Role, StreamEvent};
use crate::store::TurnStore;

#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub max_new_tokens: usize,
    pub temperature: f32,
    pub enable_thinking: bool,
    pub cadence: EmitCadence,
}

pub struct StreamingGenerator {
    model: Arc<dyn LanguageModel>,
    tokenizer: Arc<dyn ChatTokenizer>,
    store: Arc<dyn TurnStore>,
    conversation_id: i64,
    /// Prior turns, captured before the new user turn was persisted so the
    /// prompt appears in the template exactly once. Read-only for the whole
    /// generation.
    history: Vec<ChatMessage>,
    settings: GenerationSettings,
}

impl StreamingGenerator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        tokenizer: Arc<dyn ChatTokenizer>,
        store: Arc<dyn TurnStore>,
        conversation_id: i64,
        history: Vec<ChatMessage>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            model,
            tokenizer,
            store,
            conversation_id,
            history,
            settings,
        }
    }

    /// Run the loop to completion, emitting every event into `sink`. The
    /// stream always ends with exactly one terminal event: `Done` on
    /// success, `Error` if the forward pass, decode, or persistence failed
    /// mid-flight. Nothing is persisted on the error path.
    pub fn run(&self, prompt: &str, sink: &mut dyn FnMut(StreamEvent)) {
        if let Err(err) = self.generate(prompt, sink) {
            error!(conversation_id = self.conversation_id, %err, "generation failed");
            sink(StreamEvent::Error {
                message: err.to_string(),
                detail: Some(format!("{err:?}")),
            });
        }
    }

    fn generate(
        &self,
        prompt: &str,
        sink: &mut dyn FnMut(StreamEvent),
    ) -> Result<(), ServiceError> {
        let mut token_ids =
            self.tokenizer
                .render_prompt(&self.history, prompt, self.settings.enable_thinking)?;

        let params =
            SamplingParams::for_request(self.settings.enable_thinking, self.settings.temperature);
        let mut buffer = DecodeBuffer::new(self.settings.cadence);
        let mut phase = if self.settings.enable_thinking {
            Phase::Thinking
        } else {
            Phase::Responding
        };

        let eos = self.tokenizer.eos_token_id();
        let thinking_end = self.tokenizer.thinking_end_token_id();
        let mut rng = rand::thread_rng();

        debug!(
            conversation_id = self.conversation_id,
            enable_thinking = self.settings.enable_thinking,
            max_new_tokens = self.settings.max_new_tokens,
            prompt_tokens = token_ids.len(),
            "starting generation"
        );

        for step in 0..self.settings.max_new_tokens {
            let logits = self.model.forward(&token_ids)?;
            let token_id = sample(&logits, &params, &mut rng) as u32;
            token_ids.push(token_id);

            if token_id == eos {
                debug!(step, "eos reached");
                break;
            }

            // The marker flips phases and is dropped; it never lands in a
            // buffer.
            if phase == Phase::Thinking && token_id == thinking_end {
                phase = Phase::Responding;
                let text = buffer.decode(Phase::Thinking, self.tokenizer.as_ref())?;
                debug!(step, chars = text.len(), "thinking complete");
                sink(StreamEvent::ThinkingComplete { content: text });
                continue;
            }

            buffer.append(phase, token_id);
            if buffer.should_emit(phase, step) {
                let text = buffer.decode(phase, self.tokenizer.as_ref())?;
                sink(match phase {
                    Phase::Thinking => StreamEvent::Thinking { content: text },
                    Phase::Responding => StreamEvent::Response { content: text },
                });
            }
        }

        // Finalize whatever each phase accumulated, then terminate. A loop
        // that exhausted max_new_tokens without EOS still ends in Done so
        // truncation is never silent.
        if phase == Phase::Thinking && !buffer.is_empty(Phase::Thinking) {
            let text = buffer.decode(Phase::Thinking, self.tokenizer.as_ref())?;
            sink(StreamEvent::ThinkingComplete { content: text });
        }
        if !buffer.is_empty(Phase::Responding) {
            let text = buffer.decode(Phase::Responding, self.tokenizer.as_ref())?;
            sink(StreamEvent::ResponseComplete { content: text });
        }

        self.persist(&buffer)?;
        sink(StreamEvent::Done);
        Ok(())
    }

    /// Save the assistant turn: thinking and response joined by a blank
    /// line when both exist, else whichever is non-empty.
    fn persist(&self, buffer: &DecodeBuffer) -> Result<(), ServiceError> {
        if self.conversation_id <= 0 {
            return Ok(());
        }

        let thinking = if buffer.is_empty(Phase::Thinking) {
            String::new()
        } else {
            buffer.decode(Phase::Thinking, self.tokenizer.as_ref())?
        };
        let response = if buffer.is_empty(Phase::Responding) {
            String::new()
        } else {
            buffer.decode(Phase::Responding, self.tokenizer.as_ref())?
        };

        let content = match (thinking.is_empty(), response.is_empty()) {
            (false, false) => format!("{thinking}\n\n{response}"),
            (false, true) => thinking,
            _ => response,
        };

        self.store
            .save_turn(self.conversation_id, Role::Assistant, &content)?;
        Ok(())
    }
}
