//! Parley — conversational front-end over pluggable text-generation backends.
//!
//! A [`chat::ConversationOrchestrator`] owns one session's transcript and
//! turns each submission into a user turn plus an assistant turn, whatever
//! the backend does. Surfaces ([`console`], [`http`]) only render.

pub mod chat;
pub mod config;
pub mod console;
pub mod error;
pub mod gate;
pub mod http;
pub mod llm;
pub mod logger;
