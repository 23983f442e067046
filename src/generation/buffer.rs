use crate::error::ServiceError;
use crate::model::ChatTokenizer;

/// Which logical segment of the answer a generated token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Thinking,
    Responding,
}

/// How often partial text is re-decoded and emitted, in appended tokens per
/// phase. A latency/overhead tradeoff: thinking text may lag a little, the
/// response should feel live.
#[derive(Debug, Clone, Copy)]
pub struct EmitCadence {
    pub thinking: usize,
    pub response: usize,
}

impl Default for EmitCadence {
    fn default() -> Self {
        Self {
            thinking: 5,
            response: 3,
        }
    }
}

/// Generated token ids, one ordered sequence per phase.
pub struct DecodeBuffer {
    thinking: Vec<u32>,
    response: Vec<u32>,
    cadence: EmitCadence,
}

impl DecodeBuffer {
    pub fn new(cadence: EmitCadence) -> Self {
        Self {
            thinking: Vec::new(),
            response: Vec::new(),
            cadence,
        }
    }

    pub fn append(&mut self, phase: Phase, token_id: u32) {
        match phase {
            Phase::Thinking => self.thinking.push(token_id),
            Phase::Responding => self.response.push(token_id),
        }
    }

    pub fn tokens(&self, phase: Phase) -> &[u32] {
        match phase {
            Phase::Thinking => &self.thinking,
            Phase::Responding => &self.response,
        }
    }

    pub fn is_empty(&self, phase: Phase) -> bool {
        self.tokens(phase).is_empty()
    }

    /// Cadence check, evaluated after an append. Step 0 always emits so the
    /// client sees text as soon as anything exists.
    pub fn should_emit(&self, phase: Phase, step: usize) -> bool {
        let (len, every) = match phase {
            Phase::Thinking => (self.thinking.len(), self.cadence.thinking),
            Phase::Responding => (self.response.len(), self.cadence.response),
        };
        step == 0 || (every > 0 && len % every == 0)
    }

    /// Re-decode the entire phase buffer. Always a full redecode, never a
    /// diff: multi-token text units only resolve with complete left context.
    pub fn decode(
        &self,
        phase: Phase,
        tokenizer: &dyn ChatTokenizer,
    ) -> Result<String, ServiceError> {
        tokenizer.decode(self.tokens(phase), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::testing::TableTokenizer;

    fn tokenizer() -> TableTokenizer {
        TableTokenizer::new(vec!["a", "b", "c", "d", "e", "f"])
    }

    #[test]
    fn phases_accumulate_independently() {
        let mut buffer = DecodeBuffer::new(EmitCadence::default());
        buffer.append(Phase::Thinking, 0);
        buffer.append(Phase::Responding, 1);
        buffer.append(Phase::Thinking, 2);

        assert_eq!(buffer.tokens(Phase::Thinking), &[0, 2]);
        assert_eq!(buffer.tokens(Phase::Responding), &[1]);
    }

    #[test]
    fn cadence_fires_at_step_zero_and_multiples() {
        let mut buffer = DecodeBuffer::new(EmitCadence {
            thinking: 5,
            response: 3,
        });

        buffer.append(Phase::Thinking, 0);
        assert!(buffer.should_emit(Phase::Thinking, 0));
        assert!(!buffer.should_emit(Phase::Thinking, 1));

        for id in 1..5 {
            buffer.append(Phase::Thinking, id);
        }
        assert!(buffer.should_emit(Phase::Thinking, 4));

        for id in 0..3 {
            buffer.append(Phase::Responding, id);
        }
        assert!(buffer.should_emit(Phase::Responding, 7));
        buffer.append(Phase::Responding, 3);
        assert!(!buffer.should_emit(Phase::Responding, 8));
    }

    #[test]
    fn decode_is_idempotent_without_appends() {
        let mut buffer = DecodeBuffer::new(EmitCadence::default());
        let tokenizer = tokenizer();
        for id in [0, 1, 2] {
            buffer.append(Phase::Responding, id);
        }

        let first = buffer.decode(Phase::Responding, &tokenizer).unwrap();
        let second = buffer.decode(Phase::Responding, &tokenizer).unwrap();
        assert_eq!(first, "abc");
        assert_eq!(first, second);
    }

    #[test]
    fn decode_skips_special_tokens() {
        let mut buffer = DecodeBuffer::new(EmitCadence::default());
        let tokenizer = tokenizer();
        buffer.append(Phase::Thinking, 0);
        buffer.append(Phase::Thinking, tokenizer.eos_token_id());
        buffer.append(Phase::Thinking, 1);

        assert_eq!(buffer.decode(Phase::Thinking, &tokenizer).unwrap(), "ab");
    }
}
