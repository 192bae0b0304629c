//! One user submission and the ways it can be rejected before dispatch.

use thiserror::Error;

/// An uploaded file: opaque bytes plus the name the user gave it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { filename: filename.into(), bytes }
    }
}

/// Ephemeral value built from one submit event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub attachments: Vec<Attachment>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self { prompt: prompt.into(), model: model.into(), attachments: Vec::new() }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments.extend(attachments);
        self
    }
}

/// Rejections raised before anything is sent to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("please provide a valid prompt")]
    EmptyPrompt,

    #[error("model '{model}' does not accept attachments")]
    CapabilityMismatch { model: String },

    #[error("model '{model}' is not in the catalog")]
    UnknownModel { model: String },
}
