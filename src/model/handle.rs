use std::sync::Arc;

use crate::model::{ChatTokenizer, LanguageModel};

/// Immutable handle to the served model/tokenizer pair.
///
/// Built once at startup and passed explicitly into each request; there is
/// no process-wide mutable model-selection state.
#[derive(Clone)]
pub struct ModelHandle {
    pub model: Arc<dyn LanguageModel>,
    pub tokenizer: Arc<dyn ChatTokenizer>,
}

impl ModelHandle {
    pub fn new(model: Arc<dyn LanguageModel>, tokenizer: Arc<dyn ChatTokenizer>) -> Self {
        Self { model, tokenizer }
    }

    #[cfg(feature = "tch-backend")]
    pub fn load(config: &crate::config::AppConfig) -> Result<Self, crate::error::ServiceError> {
        use crate::model::backend::{HfChatTokenizer, TorchChatModel};

        let model = TorchChatModel::load(&config.model_module_path, config.device)?;
        let tokenizer = HfChatTokenizer::from_file(&config.tokenizer_path)?;
        Ok(Self::new(Arc::new(model), Arc::new(tokenizer)))
    }
}
