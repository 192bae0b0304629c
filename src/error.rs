//! Application-wide error types.
//!
//! Only process-level failures live here. Generation faults never reach this
//! enum: the orchestrator renders them into the transcript instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
