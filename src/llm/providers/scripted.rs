//! Scripted provider — replays queued outcomes and records every call.
//!
//! Used by tests and demos to drive the orchestrator through batch, stream,
//! and failure paths without a network. Clones share the same script.
//! Compiled for unit tests, or for integration tests via `test-support`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::stream;

use crate::llm::{BackendFault, Generation, StoredAttachment};

/// One canned outcome.
#[derive(Debug, Clone)]
pub enum Script {
    Whole(String),
    Stream(Vec<String>),
    Fault(BackendFault),
    /// Yield the fragments, then fail.
    StreamThenFault(Vec<String>, BackendFault),
}

impl Script {
    pub fn whole(text: impl Into<String>) -> Self {
        Script::Whole(text.into())
    }

    pub fn stream<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Script::Stream(fragments.into_iter().map(Into::into).collect())
    }

    pub fn fault(fault: BackendFault) -> Self {
        Script::Fault(fault)
    }

    pub fn stream_then_fault<I, S>(fragments: I, fault: BackendFault) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Script::StreamThenFault(fragments.into_iter().map(Into::into).collect(), fault)
    }
}

/// Arguments of one `generate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub prompt: String,
    pub model: String,
    pub attachments: Vec<StoredAttachment>,
}

#[derive(Debug, Default)]
struct ScriptState {
    queue: VecDeque<Script>,
    fallback: Option<Script>,
    calls: Vec<RecordedCall>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedProvider {
    inner: Arc<Mutex<ScriptState>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for the next unanswered call.
    pub fn then(self, script: Script) -> Self {
        self.push(script);
        self
    }

    /// Outcome used once the queue is empty.
    pub fn always(self, script: Script) -> Self {
        self.lock().fallback = Some(script);
        self
    }

    pub fn push(&self, script: Script) {
        self.lock().queue.push_back(script);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        // A panicking test thread must not wedge the others.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn generate(
        &self,
        prompt: &str,
        model: &str,
        attachments: &[StoredAttachment],
    ) -> Result<Generation, BackendFault> {
        let script = {
            let mut state = self.lock();
            state.calls.push(RecordedCall {
                prompt: prompt.to_string(),
                model: model.to_string(),
                attachments: attachments.to_vec(),
            });
            state.queue.pop_front().or_else(|| state.fallback.clone())
        };

        match script {
            Some(Script::Whole(text)) => Ok(Generation::Whole(text)),
            Some(Script::Stream(fragments)) => Ok(Generation::Stream(Box::pin(stream::iter(
                fragments.into_iter().map(Ok::<String, BackendFault>),
            )))),
            Some(Script::Fault(fault)) => Err(fault),
            Some(Script::StreamThenFault(fragments, fault)) => {
                let items = fragments.into_iter().map(Ok).chain(std::iter::once(Err(fault)));
                Ok(Generation::Stream(Box::pin(stream::iter(items))))
            }
            None => Err(BackendFault::unavailable("script exhausted")),
        }
    }
}
