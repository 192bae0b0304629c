//! LLM provider implementations.
//!
//! `build(config, api_key)` is the factory — called at startup.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
pub mod openai_compatible;
#[cfg(any(test, feature = "test-support"))]
pub mod scripted;

use crate::config::LlmConfig;
use crate::llm::{BackendFault, LlmProvider};

/// Construct an `LlmProvider` from config and an optional API key.
///
/// `api_key` is sourced from `LLM_API_KEY` env (never TOML) and is `None`
/// for keyless local models. `scripted` is not buildable from config; it
/// only exists in test builds or with the `test-support` feature.
pub fn build(config: &LlmConfig, api_key: Option<String>) -> Result<LlmProvider, BackendFault> {
    match config.provider.as_str() {
        "dummy" => Ok(LlmProvider::Dummy(dummy::DummyProvider::new(config.stream))),
        "openai" | "openai-compatible" => {
            let oai = &config.openai;
            let p = openai_compatible::OpenAiCompatibleProvider::new(
                oai.api_base_url.clone(),
                oai.temperature,
                oai.timeout_seconds,
                config.system_prompt.clone(),
                config.stream,
                api_key,
            )?;
            Ok(LlmProvider::OpenAiCompatible(p))
        }
        other => Err(BackendFault::unavailable(format!("unknown provider: {other}"))),
    }
}
