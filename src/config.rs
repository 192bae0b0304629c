//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory
//! (or an explicit `-f` path), then applies `PARLEY_WORK_DIR` and
//! `PARLEY_LOG_LEVEL` env overrides. Secrets (`LLM_API_KEY`,
//! `PARLEY_ACCESS_SECRET`) come from the environment only, never TOML.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::chat::attachments::AttachmentPolicy;
use crate::chat::catalog::{ModelCatalog, ModelEntry};
use crate::error::AppError;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// OpenAI / OpenAI-compatible provider configuration.
/// Populated from `[llm.openai]` in the TOML.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Full chat completions endpoint URL.
    pub api_base_url: String,
    /// Sampling temperature (ignored for models that forbid it).
    pub temperature: f32,
    /// Connect timeout, and whole-request timeout for non-streamed replies.
    pub timeout_seconds: u64,
}

/// Backend configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Which provider is active (`"dummy"` or `"openai"`).
    /// Maps to `default` in `[llm]`.
    pub provider: String,
    /// Ask the provider for a fragment stream instead of a whole reply.
    pub stream: bool,
    /// Optional system prompt sent ahead of every user prompt.
    pub system_prompt: Option<String>,
    pub openai: OpenAiConfig,
}

/// Upload persistence configuration.
#[derive(Debug, Clone)]
pub struct AttachmentsConfig {
    /// Prefix each stored file with a fresh UUID.
    pub unique_names: bool,
    pub on_failure: AttachmentPolicy,
}

/// HTTP surface configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    /// Socket address to bind the HTTP surface to.
    pub bind: String,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    /// Working directory for uploads and exports (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    pub catalog: ModelCatalog,
    pub llm: LlmConfig,
    pub attachments: AttachmentsConfig,
    pub http: HttpConfig,
    /// API key from `LLM_API_KEY`; `None` for keyless local models.
    pub llm_api_key: Option<String>,
    /// Shared secret from `PARLEY_ACCESS_SECRET`; `None` disables the gate.
    pub access_secret: Option<String>,
}

impl Config {
    /// Directory uploaded attachments are written under.
    pub fn uploads_dir(&self) -> PathBuf {
        self.work_dir.join("uploads")
    }

    /// Directory `/save` writes transcript exports to.
    pub fn exports_dir(&self) -> PathBuf {
        self.work_dir.join("exports")
    }
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    app: RawApp,
    #[serde(default)]
    catalog: RawCatalog,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    attachments: RawAttachments,
    #[serde(default)]
    http: RawHttp,
}

#[derive(Deserialize)]
struct RawApp {
    #[serde(default = "default_app_name")]
    name: String,
    work_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct RawCatalog {
    /// Maps to `default = "..."` in `[catalog]`.
    #[serde(rename = "default")]
    default_model: Option<String>,
    #[serde(default = "default_true")]
    validate_models: bool,
    #[serde(default = "default_models")]
    models: Vec<RawModel>,
}

impl Default for RawCatalog {
    fn default() -> Self {
        Self { default_model: None, validate_models: true, models: default_models() }
    }
}

#[derive(Deserialize)]
struct RawModel {
    id: String,
    #[serde(default = "default_false")]
    attachments: bool,
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default = "default_false")]
    stream: bool,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    openai: RawOpenAiConfig,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            stream: false,
            system_prompt: None,
            openai: RawOpenAiConfig::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawOpenAiConfig {
    #[serde(default = "default_openai_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_openai_temperature")]
    temperature: f32,
    #[serde(default = "default_openai_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawOpenAiConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_openai_api_base_url(),
            temperature: default_openai_temperature(),
            timeout_seconds: default_openai_timeout_seconds(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawAttachments {
    #[serde(default)]
    unique_names: bool,
    #[serde(default)]
    on_failure: AttachmentPolicy,
}

#[derive(Deserialize)]
struct RawHttp {
    #[serde(default = "default_false")]
    enabled: bool,
    #[serde(default = "default_http_bind")]
    bind: String,
}

impl Default for RawHttp {
    fn default() -> Self {
        Self { enabled: false, bind: default_http_bind() }
    }
}

fn default_app_name() -> String { "parley".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_llm_provider() -> String { "dummy".to_string() }
fn default_openai_api_base_url() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_openai_temperature() -> f32 { 0.7 }
fn default_openai_timeout_seconds() -> u64 { 60 }
fn default_http_bind() -> String { "127.0.0.1:8080".to_string() }
fn default_true() -> bool { true }
fn default_false() -> bool { false }

fn default_models() -> Vec<RawModel> {
    [
        ("gpt-4o-mini", true),
        ("gpt-4o", true),
        ("gpt-4", false),
        ("gpt-3.5-turbo", false),
        ("claude-3.5-sonnet", false),
        ("unity", false),
    ]
    .into_iter()
    .map(|(id, attachments)| RawModel { id: id.to_string(), attachments })
    .collect()
}

/// Load config from `path` (or `config/default.toml`), then apply env-var overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("PARLEY_WORK_DIR").ok();
    let log_level_override = env::var("PARLEY_LOG_LEVEL").ok();
    let mut config = load_from(
        Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH)),
        work_dir_override.as_deref(),
        log_level_override.as_deref(),
    )?;
    config.llm_api_key = env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
    config.access_secret = env::var("PARLEY_ACCESS_SECRET").ok().filter(|s| !s.is_empty());
    Ok(config)
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars; secrets are
/// left unset.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let app = parsed.app;
    let work_dir = expand_home(work_dir_override.unwrap_or(&app.work_dir));
    let log_level = log_level_override.unwrap_or(&app.log_level).to_string();

    let catalog = ModelCatalog::new(
        parsed
            .catalog
            .models
            .into_iter()
            .map(|m| ModelEntry { id: m.id, attachments: m.attachments })
            .collect(),
        parsed.catalog.default_model,
        parsed.catalog.validate_models,
    )
    .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))?;

    Ok(Config {
        app_name: app.name,
        work_dir,
        log_level,
        catalog,
        llm: LlmConfig {
            provider: parsed.llm.provider,
            stream: parsed.llm.stream,
            system_prompt: parsed.llm.system_prompt.filter(|s| !s.trim().is_empty()),
            openai: OpenAiConfig {
                api_base_url: parsed.llm.openai.api_base_url,
                temperature: parsed.llm.openai.temperature,
                timeout_seconds: parsed.llm.openai.timeout_seconds,
            },
        },
        attachments: AttachmentsConfig {
            unique_names: parsed.attachments.unique_names,
            on_failure: parsed.attachments.on_failure,
        },
        http: HttpConfig {
            enabled: parsed.http.enabled,
            bind: parsed.http.bind,
        },
        llm_api_key: None,
        access_secret: None,
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for tests — dummy backend, no secrets, no network.
impl Config {
    pub fn test_default(work_dir: &Path) -> Self {
        Self {
            app_name: "test".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            catalog: ModelCatalog::from_ids(["model-a", "model-b"]),
            llm: LlmConfig {
                provider: "dummy".into(),
                stream: false,
                system_prompt: None,
                openai: OpenAiConfig {
                    api_base_url: "http://localhost:0/v1/chat/completions".into(),
                    temperature: 0.0,
                    timeout_seconds: 1,
                },
            },
            attachments: AttachmentsConfig {
                unique_names: false,
                on_failure: AttachmentPolicy::Skip,
            },
            http: HttpConfig { enabled: false, bind: default_http_bind() },
            llm_api_key: None,
            access_secret: None,
        }
    }
}
