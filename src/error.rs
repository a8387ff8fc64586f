use std::net::SocketAddr;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    /// Body could not be parsed even after repair. Carries the error from the
    /// first (unrepaired) parse attempt.
    #[error("Parse error: {message}. Body: {excerpt}")]
    TransportParse { message: String, excerpt: String },

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Tool {0} not found")]
    ToolNotFound(String),

    /// Provider failures pass through with their original message.
    #[error(transparent)]
    ToolExecution(#[from] anyhow::Error),

    #[error("Failed to initialize tool provider `{category}`: {reason:#}")]
    Configuration {
        category: String,
        reason: anyhow::Error,
    },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}
