use std::collections::BTreeMap;

use config::{LlmConfig, ModelConfig};

use crate::{
    error::LlmError,
    messages::{Model, ModelsResponse},
};

/// Resolves the model a request asks for to the provider's model name.
pub(crate) struct ModelManager {
    models: BTreeMap<String, ModelConfig>,
    default_model: Option<String>,
    owner: String,
}

impl ModelManager {
    pub fn new(config: &LlmConfig, owner: impl Into<String>) -> Self {
        Self {
            models: config.provider.models.clone(),
            default_model: config.default_model.clone(),
            owner: owner.into(),
        }
    }

    /// The provider model name for a request.
    ///
    /// Without an explicit choice the configured default is used, then the
    /// first configured model.
    pub fn resolve(&self, requested: Option<&str>) -> crate::Result<String> {
        let id = match requested.map(str::trim).filter(|model| !model.is_empty()) {
            Some(model) => model,
            None => self
                .default_model
                .as_deref()
                .or_else(|| self.models.keys().next().map(String::as_str))
                .ok_or_else(|| LlmError::ModelNotFound("default".to_string()))?,
        };

        let config = self
            .models
            .get(id)
            .ok_or_else(|| LlmError::ModelNotFound(id.to_string()))?;

        Ok(config.rename.as_deref().unwrap_or(id).to_string())
    }

    pub fn list(&self) -> ModelsResponse {
        let data = self
            .models
            .keys()
            .map(|id| Model {
                id: id.clone(),
                object: "model".to_string(),
                owned_by: self.owner.clone(),
            })
            .collect();

        ModelsResponse {
            object: "list".to_string(),
            data,
        }
    }
}
