//! Generation backend abstraction.
//!
//! `LlmProvider` is an enum over concrete provider implementations.
//! Add a new variant + module in `providers/` for each additional backend.
//!
//! Provider instances are shared immutable capabilities — clone them freely
//! and hand the same one to every session. `generate` returns either a whole
//! reply or a lazy stream of text fragments; which one depends on how the
//! provider was configured, not on the caller.

pub mod providers;

use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;

use futures_util::Stream;
use serde::Serialize;
use thiserror::Error;

// ── Faults ────────────────────────────────────────────────────────────────────

/// Coarse classification of a generation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Endpoint reachable but refusing work (auth, quota, 5xx, exhausted script).
    BackendUnavailable,
    /// The model identifier is not known to the catalog or the backend.
    InvalidModel,
    /// Connection, timeout, or malformed wire data.
    Transport,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::BackendUnavailable => write!(f, "backend unavailable"),
            FaultKind::InvalidModel => write!(f, "invalid model"),
            FaultKind::Transport => write!(f, "transport error"),
        }
    }
}

/// Any failure signalled by a backend while producing a reply.
///
/// Kept as a tagged value until it is written into the transcript, where
/// [`BackendFault::user_message`] turns it into chat text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct BackendFault {
    pub kind: FaultKind,
    pub detail: String,
}

impl BackendFault {
    pub fn new(kind: FaultKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self::new(FaultKind::BackendUnavailable, detail)
    }

    pub fn invalid_model(model: &str) -> Self {
        Self::new(FaultKind::InvalidModel, format!("unknown model '{model}'"))
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(FaultKind::Transport, detail)
    }

    /// Human-readable text rendered as an assistant turn.
    pub fn user_message(&self) -> String {
        let lead = match self.kind {
            FaultKind::BackendUnavailable => "The generation backend is unavailable",
            FaultKind::InvalidModel => "The selected model was rejected",
            FaultKind::Transport => "The generation backend could not be reached",
        };
        format!("⚠️ {lead}. An error occurred with the generation backend: {}", self.detail)
    }
}

// ── Request / result types ────────────────────────────────────────────────────

/// An attachment already persisted to local storage.
///
/// Backends receive a path rather than bytes; some of them need a file on
/// disk, and the HTTP provider reads it back when encoding the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAttachment {
    /// Name as supplied by the user (final path component only).
    pub filename: String,
    pub path: PathBuf,
    pub mime: &'static str,
}

/// Lazy fragment sequence. Concatenating the `Ok` items in order yields the
/// finished reply; the first `Err` ends the reply.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, BackendFault>> + Send>>;

/// What a backend hands back for one request.
pub enum Generation {
    Whole(String),
    Stream(FragmentStream),
}

impl fmt::Debug for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Generation::Whole(text) => f.debug_tuple("Whole").field(text).finish(),
            Generation::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

// ── Provider enum ─────────────────────────────────────────────────────────────

/// All available provider backends.
///
/// Enum dispatch avoids `dyn` trait objects and the `async-trait` dependency.
/// Adding a backend = new module + new variant + new `generate` arm.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Dummy(providers::dummy::DummyProvider),
    OpenAiCompatible(providers::openai_compatible::OpenAiCompatibleProvider),
    #[cfg(any(test, feature = "test-support"))]
    Scripted(providers::scripted::ScriptedProvider),
}

impl LlmProvider {
    /// Send one prompt to the backend.
    pub async fn generate(
        &self,
        prompt: &str,
        model: &str,
        attachments: &[StoredAttachment],
    ) -> Result<Generation, BackendFault> {
        match self {
            LlmProvider::Dummy(p) => p.generate(prompt, model, attachments).await,
            LlmProvider::OpenAiCompatible(p) => p.generate(prompt, model, attachments).await,
            #[cfg(any(test, feature = "test-support"))]
            LlmProvider::Scripted(p) => p.generate(prompt, model, attachments).await,
        }
    }

    /// Reachability probe. Local providers are always reachable.
    pub async fn ping(&self) -> Result<(), BackendFault> {
        match self {
            LlmProvider::OpenAiCompatible(p) => p.ping().await,
            LlmProvider::Dummy(_) => Ok(()),
            #[cfg(any(test, feature = "test-support"))]
            LlmProvider::Scripted(_) => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::Dummy(_) => "dummy",
            LlmProvider::OpenAiCompatible(_) => "openai",
            #[cfg(any(test, feature = "test-support"))]
            LlmProvider::Scripted(_) => "scripted",
        }
    }
}
