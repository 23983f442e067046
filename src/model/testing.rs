//! Scripted collaborators for exercising the generation loop without a
//! real model.

use parking_lot::Mutex;

use crate::error::ServiceError;
use crate::model::{ChatMessage, ChatTokenizer, LanguageModel, Role};
use crate::store::TurnStore;

/// Tokenizer over a tiny fixed vocabulary; a token id indexes the table.
/// The two ids past the table are reserved for EOS and thinking-end.
pub(crate) struct TableTokenizer {
    vocab: Vec<&'static str>,
    eos: u32,
    thinking_end: u32,
}

impl TableTokenizer {
    pub fn new(vocab: Vec<&'static str>) -> Self {
        let eos = vocab.len() as u32;
        Self {
            vocab,
            eos,
            thinking_end: eos + 1,
        }
    }

    pub fn vocab_size_with_specials(&self) -> usize {
        self.vocab.len() + 2
    }
}

impl ChatTokenizer for TableTokenizer {
    fn render_prompt(
        &self,
        history: &[ChatMessage],
        _prompt: &str,
        _enable_thinking: bool,
    ) -> Result<Vec<u32>, ServiceError> {
        // One placeholder id per prior turn plus one for the new prompt; the
        // scripted model ignores its input anyway.
        Ok(vec![0; history.len() + 1])
    }

    fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String, ServiceError> {
        let mut out = String::new();
        for &id in tokens {
            if id == self.eos || id == self.thinking_end {
                if !skip_special_tokens {
                    out.push_str("<special>");
                }
                continue;
            }
            let piece = self
                .vocab
                .get(id as usize)
                .ok_or_else(|| ServiceError::Tokenizer(format!("unknown token id {id}")))?;
            out.push_str(piece);
        }
        Ok(out)
    }

    fn eos_token_id(&self) -> u32 {
        self.eos
    }

    fn thinking_end_token_id(&self) -> u32 {
        self.thinking_end
    }
}

/// Tokenizer whose decode always fails, for error-path tests.
pub(crate) struct BrokenTokenizer;

impl ChatTokenizer for BrokenTokenizer {
    fn render_prompt(
        &self,
        _history: &[ChatMessage],
        _prompt: &str,
        _enable_thinking: bool,
    ) -> Result<Vec<u32>, ServiceError> {
        Ok(vec![0])
    }

    fn decode(&self, _tokens: &[u32], _skip_special_tokens: bool) -> Result<String, ServiceError> {
        Err(ServiceError::Tokenizer("decode exploded".into()))
    }

    fn eos_token_id(&self) -> u32 {
        u32::MAX
    }

    fn thinking_end_token_id(&self) -> u32 {
        u32::MAX - 1
    }
}

/// Model that deterministically favors one scripted token per step, then
/// EOS forever. The favored logit dominates so hard that the weighted draw
/// cannot pick anything else.
pub(crate) struct ScriptedModel {
    script: Vec<u32>,
    eos: u32,
    vocab_size: usize,
    step: Mutex<usize>,
    fail_at: Option<(usize, &'static str)>,
}

impl ScriptedModel {
    pub fn new(script: Vec<u32>, eos: u32, vocab_size: usize) -> Self {
        Self {
            script,
            eos,
            vocab_size,
            step: Mutex::new(0),
            fail_at: None,
        }
    }

    pub fn failing_at(mut self, step: usize, message: &'static str) -> Self {
        self.fail_at = Some((step, message));
        self
    }
}

impl LanguageModel for ScriptedModel {
    fn forward(&self, _tokens: &[u32]) -> Result<Vec<f32>, ServiceError> {
        let mut step = self.step.lock();
        if let Some((at, message)) = self.fail_at {
            if *step == at {
                return Err(ServiceError::Inference(message.into()));
            }
        }
        let favored = self.script.get(*step).copied().unwrap_or(self.eos);
        *step += 1;

        let mut logits = vec![-100.0f32; self.vocab_size];
        logits[favored as usize] = 100.0;
        Ok(logits)
    }
}

/// In-memory stand-in for the conversation store.
#[derive(Default)]
pub(crate) struct MemoryStore {
    pub history: Vec<ChatMessage>,
    pub saved: Mutex<Vec<(i64, Role, String)>>,
}

impl TurnStore for MemoryStore {
    fn history(&self, conversation_id: i64) -> Result<Vec<ChatMessage>, ServiceError> {
        if conversation_id <= 0 {
            return Ok(Vec::new());
        }
        Ok(self.history.clone())
    }

    fn save_turn(
        &self,
        conversation_id: i64,
        role: Role,
        content: &str,
    ) -> Result<i64, ServiceError> {
        let mut saved = self.saved.lock();
        saved.push((conversation_id, role, content.to_string()));
        Ok(saved.len() as i64)
    }
}
