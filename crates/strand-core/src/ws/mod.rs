//! WebSocket transport with auto-reconnect and connection state tracking.

pub mod client;
pub mod state;

pub use client::{HandshakeFn, LinkEvent, OnLinkCallback, OnMessageCallback, WsConnConfig, WsConnection};
pub use state::{ConnStateTracker, OnStateCallback};
