//! Per-session request/response loop.
//!
//! ```text
//! submit(prompt, model, attachments)
//!   │  trim-empty? ──► Err(EmptyPrompt), transcript untouched
//!   ├─ push user turn ─────────────────────────────► notify
//!   ├─ drop attachments the model can't take (degraded mode)
//!   ├─ persist the rest (policy: skip | abort)
//!   └─ backend.generate()
//!        ├─ Whole(text)   → push assistant turn ──► notify
//!        ├─ Stream(frags) → begin assistant turn ─► notify
//!        │                  each fragment: extend ► notify
//!        └─ Err(fault)    → push error turn ──────► notify
//! ```
//!
//! One orchestrator owns one session's transcript. `submit` takes
//! `&mut self`, so a second submission cannot start while one is running.

use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::llm::{BackendFault, FragmentStream, Generation, LlmProvider, StoredAttachment};

use super::attachments::{AttachmentPolicy, AttachmentStore};
use super::catalog::ModelCatalog;
use super::request::{Attachment, GenerationRequest, ValidationError};
use super::transcript::{Transcript, Turn};

// ── Observer ──────────────────────────────────────────────────────────────────

/// Receives the whole transcript after every mutation.
///
/// The last turn may be an assistant turn that is still filling.
pub trait TranscriptObserver {
    fn on_update(&mut self, turns: &[Turn]);
}

impl<F> TranscriptObserver for F
where
    F: FnMut(&[Turn]),
{
    fn on_update(&mut self, turns: &[Turn]) {
        self(turns)
    }
}

/// Observer for pull-based hosts that read `transcript()` after `submit`.
pub struct NoopObserver;

impl TranscriptObserver for NoopObserver {
    fn on_update(&mut self, _turns: &[Turn]) {}
}

// ── State ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Idle,
    AwaitingBackend,
    Streaming,
    Failed,
    Finalized,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct ConversationOrchestrator {
    session_id: Uuid,
    started_at: DateTime<Utc>,
    backend: LlmProvider,
    catalog: ModelCatalog,
    store: AttachmentStore,
    policy: AttachmentPolicy,
    transcript: Transcript,
    state: RequestState,
}

impl ConversationOrchestrator {
    /// Start a session. Uploads go under `store`'s directory.
    pub fn new(
        session_id: Uuid,
        backend: LlmProvider,
        catalog: ModelCatalog,
        store: AttachmentStore,
        policy: AttachmentPolicy,
    ) -> Self {
        Self {
            session_id,
            started_at: Utc::now(),
            backend,
            catalog,
            store,
            policy,
            transcript: Transcript::new(),
            state: RequestState::Idle,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// Convenience wrapper over [`Self::submit`] taking a whole request.
    pub async fn submit_request(
        &mut self,
        request: GenerationRequest,
        observer: &mut impl TranscriptObserver,
    ) -> Result<(), ValidationError> {
        self.submit(&request.prompt, &request.model, request.attachments, observer).await
    }

    /// Turn one user submission into one user turn plus one assistant turn.
    ///
    /// The only error is [`ValidationError::EmptyPrompt`], returned before
    /// anything is appended. Backend and attachment faults end up as the
    /// assistant turn's text.
    pub async fn submit(
        &mut self,
        prompt: &str,
        model: &str,
        attachments: Vec<Attachment>,
        observer: &mut impl TranscriptObserver,
    ) -> Result<(), ValidationError> {
        if prompt.trim().is_empty() {
            debug!(session_id = %self.session_id, "empty prompt rejected");
            return Err(ValidationError::EmptyPrompt);
        }

        self.append(Turn::user(prompt), observer);
        self.transition(RequestState::AwaitingBackend);

        info!(
            session_id = %self.session_id,
            %model,
            prompt_len = prompt.len(),
            attachments = attachments.len(),
            "dispatching generation request"
        );

        let outcome = match self.prepare_attachments(model, attachments).await {
            Ok(stored) => self.dispatch(prompt, model, &stored).await,
            Err(message) => Err(message),
        };

        match outcome {
            Ok(Generation::Whole(text)) => {
                self.append(Turn::assistant(text), observer);
                self.transition(RequestState::Finalized);
            }
            Ok(Generation::Stream(fragments)) => {
                self.drain(fragments, observer).await;
            }
            Err(message) => {
                self.transition(RequestState::Failed);
                self.append(Turn::assistant(message), observer);
                self.transition(RequestState::Finalized);
            }
        }

        self.transition(RequestState::Idle);
        Ok(())
    }

    /// Persist uploads per policy. Models that can't take attachments get
    /// none, and nothing is written for them.
    /// `Err` carries the assistant-visible message for an aborted request.
    async fn prepare_attachments(
        &self,
        model: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Vec<StoredAttachment>, String> {
        if attachments.is_empty() {
            return Ok(Vec::new());
        }

        if !self.catalog.supports_attachments(model) {
            warn!(
                session_id = %self.session_id,
                %model,
                dropped = attachments.len(),
                "model does not accept attachments — sending prompt only"
            );
            return Ok(Vec::new());
        }

        let mut stored = Vec::with_capacity(attachments.len());
        for attachment in &attachments {
            match self.store.persist(attachment).await {
                Ok(s) => stored.push(s),
                Err(e) => match self.policy {
                    AttachmentPolicy::Skip => {
                        warn!(session_id = %self.session_id, error = %e, "attachment skipped");
                    }
                    AttachmentPolicy::Abort => {
                        warn!(session_id = %self.session_id, error = %e, "request aborted on attachment failure");
                        return Err(format!("⚠️ Your attachment could not be saved, so the request was not sent: {e}"));
                    }
                },
            }
        }

        Ok(stored)
    }

    async fn dispatch(
        &self,
        prompt: &str,
        model: &str,
        attachments: &[StoredAttachment],
    ) -> Result<Generation, String> {
        let result = if self.catalog.validates_models() && !self.catalog.contains(model) {
            Err(BackendFault::invalid_model(model))
        } else {
            self.backend.generate(prompt, model, attachments).await
        };

        result.map_err(|fault| {
            warn!(
                session_id = %self.session_id,
                backend = self.backend.name(),
                kind = ?fault.kind,
                detail = %fault.detail,
                "generation failed"
            );
            fault.user_message()
        })
    }

    /// Fill a fresh assistant turn fragment by fragment.
    async fn drain(&mut self, mut fragments: FragmentStream, observer: &mut impl TranscriptObserver) {
        self.begin_assistant(observer);
        self.transition(RequestState::Streaming);

        let mut count = 0usize;
        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    count += 1;
                    self.transcript.append_fragment(&fragment);
                    observer.on_update(self.transcript.turns());
                }
                Err(fault) => {
                    warn!(
                        session_id = %self.session_id,
                        kind = ?fault.kind,
                        detail = %fault.detail,
                        fragments = count,
                        "stream failed"
                    );
                    self.transition(RequestState::Failed);
                    let separator = if count == 0 { "" } else { "\n\n" };
                    self.transcript
                        .append_fragment(&format!("{separator}{}", fault.user_message()));
                    observer.on_update(self.transcript.turns());
                    break;
                }
            }
        }

        self.transcript.finalize();
        debug!(session_id = %self.session_id, fragments = count, "stream finished");
        self.transition(RequestState::Finalized);
        observer.on_update(self.transcript.turns());
    }

    fn append(&mut self, turn: Turn, observer: &mut impl TranscriptObserver) {
        // Submissions run to completion, so nothing is in flight here.
        if self.transcript.push(turn).is_err() {
            warn!(session_id = %self.session_id, "turn appended while another was in flight");
            return;
        }
        observer.on_update(self.transcript.turns());
    }

    fn begin_assistant(&mut self, observer: &mut impl TranscriptObserver) {
        if self.transcript.begin_assistant().is_err() {
            warn!(session_id = %self.session_id, "assistant turn begun while another was in flight");
            return;
        }
        observer.on_update(self.transcript.turns());
    }

    fn transition(&mut self, next: RequestState) {
        debug!(session_id = %self.session_id, from = ?self.state, to = ?next, "request state");
        self.state = next;
    }
}
