//! Concrete model and tokenizer collaborators.
//!
//! The tokenizer side is plain `tokenizers`; the model side is a TorchScript
//! module behind the `tch-backend` feature so the core builds without
//! libtorch.

use std::path::Path;

use tokenizers::Tokenizer;

use crate::error::ServiceError;
use crate::model::{ChatMessage, ChatTokenizer};

/// `</think>` in the served model family's vocabulary.
pub const THINKING_END_TOKEN_ID: u32 = 151668;

const EOS_TOKEN: &str = "<|im_end|>";

/// Hugging Face tokenizer applying a ChatML-style template.
pub struct HfChatTokenizer {
    inner: Tokenizer,
    eos_token_id: u32,
    thinking_end_token_id: u32,
}

impl HfChatTokenizer {
    pub fn from_file(path: &Path) -> Result<Self, ServiceError> {
        let inner =
            Tokenizer::from_file(path).map_err(|e| ServiceError::Tokenizer(e.to_string()))?;
        let eos_token_id = inner.token_to_id(EOS_TOKEN).ok_or_else(|| {
            ServiceError::Tokenizer(format!("vocabulary has no {EOS_TOKEN} token"))
        })?;
        Ok(Self {
            inner,
            eos_token_id,
            thinking_end_token_id: THINKING_END_TOKEN_ID,
        })
    }
}

impl ChatTokenizer for HfChatTokenizer {
    fn render_prompt(
        &self,
        history: &[ChatMessage],
        prompt: &str,
        enable_thinking: bool,
    ) -> Result<Vec<u32>, ServiceError> {
        let mut text = String::new();
        for message in history {
            text.push_str("<|im_start|>");
            text.push_str(message.role.as_str());
            text.push('\n');
            text.push_str(&message.content);
            text.push_str("<|im_end|>\n");
        }
        text.push_str("<|im_start|>user\n");
        text.push_str(prompt);
        text.push_str("<|im_end|>\n<|im_start|>assistant\n");
        if !enable_thinking {
            // Pre-closed think block steers the model straight to the answer.
            text.push_str("<think>\n\n</think>\n\n");
        }

        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[u32], skip_special_tokens: bool) -> Result<String, ServiceError> {
        self.inner
            .decode(tokens, skip_special_tokens)
            .map_err(|e| ServiceError::Tokenizer(e.to_string()))
    }

    fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }

    fn thinking_end_token_id(&self) -> u32 {
        self.thinking_end_token_id
    }
}

#[cfg(feature = "tch-backend")]
pub use torch::TorchChatModel;

#[cfg(feature = "tch-backend")]
mod torch {
    use std::path::Path;

    use parking_lot::Mutex;
    use tch::{Device, Kind, Tensor, no_grad};

    use crate::error::ServiceError;
    use crate::model::LanguageModel;

    /// TorchScript chat model. The traced module is not re-entrant, so the
    /// forward pass serializes behind a mutex.
    pub struct TorchChatModel {
        device: Device,
        module: Mutex<tch::CModule>,
    }

    impl TorchChatModel {
        pub fn load(module_path: &Path, device: Device) -> Result<Self, ServiceError> {
            if !module_path.exists() {
                return Err(ServiceError::Other(format!(
                    "model artifact missing: {}",
                    module_path.display()
                )));
            }
            let mut module = tch::CModule::load_on_device(module_path, device)
                .map_err(|e| ServiceError::Inference(e.to_string()))?;
            module.set_eval();

            Ok(Self {
                device,
                module: Mutex::new(module),
            })
        }
    }

    impl LanguageModel for TorchChatModel {
        fn forward(&self, tokens: &[u32]) -> Result<Vec<f32>, ServiceError> {
            let ids: Vec<i64> = tokens.iter().map(|&id| id as i64).collect();

            no_grad(|| {
                let module = self.module.lock();

                let input = Tensor::from_slice(&ids)
                    .reshape([1, ids.len() as i64])
                    .to(self.device);

                // Traced models may return a bare tensor or (logits, past).
                let output = module
                    .forward_is(&[tch::IValue::Tensor(input)])
                    .map_err(|e| ServiceError::Inference(e.to_string()))?;
                let logits = match output {
                    tch::IValue::Tensor(t) => t,
                    tch::IValue::Tuple(ref tuple) if !tuple.is_empty() => match &tuple[0] {
                        tch::IValue::Tensor(t) => t.shallow_clone(),
                        _ => {
                            return Err(ServiceError::Inference(
                                "expected tensor as first tuple element".into(),
                            ));
                        }
                    },
                    _ => {
                        return Err(ServiceError::Inference(
                            "unexpected model output format".into(),
                        ));
                    }
                };

                // [1, seq_len, vocab] -> logits for the next position.
                let last = logits.select(1, -1).squeeze().to_kind(Kind::Float);
                Vec::<f32>::try_from(&last).map_err(|e| ServiceError::Inference(e.to_string()))
            })
        }
    }
}
