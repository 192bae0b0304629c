//! Dummy provider — echoes the prompt back prefixed with `[echo]`.
//! Lets the console and HTTP surfaces run end to end without an API key.

use futures_util::stream;

use crate::llm::{BackendFault, Generation, StoredAttachment};

#[derive(Debug, Clone, Default)]
pub struct DummyProvider {
    /// Yield the echo word by word instead of in one piece.
    pub stream: bool,
}

impl DummyProvider {
    pub fn new(stream: bool) -> Self {
        Self { stream }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        _model: &str,
        attachments: &[StoredAttachment],
    ) -> Result<Generation, BackendFault> {
        let mut text = format!("[echo] {prompt}");
        if !attachments.is_empty() {
            let names: Vec<&str> = attachments.iter().map(|a| a.filename.as_str()).collect();
            text.push_str(&format!(" [attachments: {}]", names.join(", ")));
        }

        if !self.stream {
            return Ok(Generation::Whole(text));
        }

        let fragments: Vec<Result<String, BackendFault>> =
            text.split_inclusive(' ').map(|w| Ok(w.to_string())).collect();
        Ok(Generation::Stream(Box::pin(stream::iter(fragments))))
    }
}
