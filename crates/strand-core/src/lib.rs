//! # strand-core
//!
//! Core crate for the strand trade client, providing:
//!
//! - **Types** (`types`) — market ids, orders, balances, connection state
//! - **Configuration** (`config`) — JSON config deserialization and default location
//! - **Error types** (`error`) — domain-specific `StrandError` via thiserror
//! - **WebSocket** (`ws`) — WS client with auto-reconnect + state tracking
//! - **Logging** (`logging`) — tracing-based structured logging

pub mod config;
pub mod error;
pub mod logging;
pub mod types;
pub mod ws;

// Re-export types at crate root for convenience.
pub use types::*;
