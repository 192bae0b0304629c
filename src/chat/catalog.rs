//! The enumerated set of selectable models.

use serde::Serialize;

use super::request::{GenerationRequest, ValidationError};

/// One selectable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelEntry {
    pub id: String,
    /// Whether the backend accepts attachments for this model.
    pub attachments: bool,
}

/// Statically configured model catalog — the dropdown's option list.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelEntry>,
    default_model: String,
    validate_models: bool,
}

impl ModelCatalog {
    /// Build a catalog. `default_model` falls back to the first entry.
    pub fn new(
        models: Vec<ModelEntry>,
        default_model: Option<String>,
        validate_models: bool,
    ) -> Result<Self, String> {
        let first = models
            .first()
            .map(|m| m.id.clone())
            .ok_or_else(|| "model catalog must list at least one model".to_string())?;
        let default_model = default_model.unwrap_or(first);
        if !models.iter().any(|m| m.id == default_model) {
            return Err(format!("default model '{default_model}' is not in the catalog"));
        }
        Ok(Self { models, default_model, validate_models })
    }

    /// Text-only catalog with validation on; the first id is the default.
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let models: Vec<ModelEntry> = ids
            .into_iter()
            .map(|id| ModelEntry { id: id.into(), attachments: false })
            .collect();
        let default_model = models.first().map(|m| m.id.clone()).unwrap_or_default();
        Self { models, default_model, validate_models: true }
    }

    /// Mark `id` as accepting attachments.
    pub fn with_attachments(mut self, id: &str) -> Self {
        if let Some(m) = self.models.iter_mut().find(|m| m.id == id) {
            m.attachments = true;
        }
        self
    }

    pub fn models(&self) -> &[ModelEntry] {
        &self.models
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Whether unknown ids are rejected locally instead of being forwarded.
    pub fn validates_models(&self) -> bool {
        self.validate_models
    }

    pub fn get(&self, id: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn supports_attachments(&self, id: &str) -> bool {
        self.get(id).is_some_and(|m| m.attachments)
    }

    /// Strict pre-submit check for callers that must not silently drop
    /// attachments or forward unknown models.
    pub fn check_request(&self, request: &GenerationRequest) -> Result<(), ValidationError> {
        if request.prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        if !self.contains(&request.model) {
            return Err(ValidationError::UnknownModel { model: request.model.clone() });
        }
        if !request.attachments.is_empty() && !self.supports_attachments(&request.model) {
            return Err(ValidationError::CapabilityMismatch { model: request.model.clone() });
        }
        Ok(())
    }
}
