//! Typed error definitions for the strand trade client.
//!
//! Provides [`StrandError`] for domain-specific errors that are more
//! informative than plain `anyhow::Error` strings. All variants implement
//! `std::error::Error` via `thiserror`, so they travel inside `anyhow::Result`
//! and can be recovered with `downcast_ref` where the exit status is decided.

use thiserror::Error;

/// Domain-specific errors for the strand trade client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrandError {
    /// Bad or missing startup arguments or configuration file contents.
    #[error("config error: {0}")]
    Config(String),

    /// The requested `--mode` is not one of the supported actions.
    #[error("unknown mode: {0:?}")]
    UnknownMode(String),

    /// WebSocket connection, handshake, or communication error.
    #[error("websocket error: {0}")]
    WebSocket(String),

    /// The service refused our credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A frame or payload could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// The session is not in a state that allows the requested operation.
    #[error("session error: {0}")]
    Session(String),

    /// The service rejected a trading operation (order placement, cancel, ...).
    #[error("trading error: {0}")]
    Trading(String),
}

impl StrandError {
    /// Whether this error was raised before any connection was attempted.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::UnknownMode(_))
    }
}
