//! Conversation layer: transcript, catalog, uploads, and the per-session
//! [`ConversationOrchestrator`].
//!
//! ```text
//! surface ──submit──► ConversationOrchestrator ──generate──► LlmProvider
//!    ▲                    │  owns Transcript
//!    └──── on_update ─────┘
//! ```

pub mod attachments;
pub mod catalog;
pub mod export;
pub mod orchestrator;
pub mod request;
pub mod transcript;

pub use attachments::{AttachmentPolicy, AttachmentStore};
pub use catalog::{ModelCatalog, ModelEntry};
pub use orchestrator::{ConversationOrchestrator, NoopObserver, RequestState, TranscriptObserver};
pub use request::{Attachment, GenerationRequest, ValidationError};
pub use transcript::{Role, Transcript, Turn};

use uuid::Uuid;

use crate::config::Config;
use crate::llm::LlmProvider;

/// Start a fresh session wired to the shared `backend`.
pub fn new_session(config: &Config, backend: LlmProvider) -> ConversationOrchestrator {
    let session_id = Uuid::new_v4();
    ConversationOrchestrator::new(
        session_id,
        backend,
        config.catalog.clone(),
        AttachmentStore::for_session(&config.uploads_dir(), session_id, config.attachments.unique_names),
        config.attachments.on_failure,
    )
}
