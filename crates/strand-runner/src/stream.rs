//! `strand-stream`: print a market stream until interrupted.
//!
//! The client subscribes to the given keys on every (re)connect and prints
//! each received payload. State changes are printed with their cause.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Value, json};
use strand_core::ConnState;
use strand_core::config;
use strand_core::error::StrandError;
use strand_core::ws::{ConnStateTracker, LinkEvent, WsConnConfig, WsConnection};
use tracing::{debug, info};
use url::Url;

/// Market stream client.
#[derive(Parser, Debug, Clone)]
#[command(name = "strand-stream", about = "Print a strand market stream")]
pub struct StreamCli {
    /// Stream URL (ws:// or wss://). Defaults to the configured stream URL.
    pub url: Option<String>,

    /// Subscription key. May be given multiple times.
    #[arg(long = "sub")]
    pub subs: Vec<String>,

    /// Pretty-print received JSON payloads.
    #[arg(long)]
    pub detailed: bool,

    /// Configuration file path (JSON).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    pub log_dir: Option<String>,
}

/// Parse `raw`, accepting only `ws` and `wss` URLs.
pub fn parse_stream_url(raw: &str) -> Result<Url, StrandError> {
    let url = Url::parse(raw).map_err(|e| StrandError::Config(format!("failed to parse address {raw}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(StrandError::Config(format!(
            "the url should have \"ws\" or \"wss\" scheme, got {other:?}"
        ))),
    }
}

/// Subscription request sent after every connect.
pub fn subscribe_message(api_key: &str, subs: &[String]) -> String {
    json!({
        "type": "subscribe",
        "api_key": api_key,
        "subscriptions": subs,
    })
    .to_string()
}

/// Render a received payload; `detailed` pretty-prints JSON.
pub fn render_message(text: &str, detailed: bool) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(v) if detailed => serde_json::to_string_pretty(&v).unwrap_or_else(|_| text.to_string()),
        Ok(v) => v.to_string(),
        Err(_) => text.to_string(),
    }
}

/// `State updated: old -> new`, with the cause in parentheses if any.
pub fn render_transition(from: ConnState, to: ConnState, cause: Option<&str>) -> String {
    match cause {
        Some(c) => format!("State updated: {from} -> {to} ({c})"),
        None => format!("State updated: {from} -> {to}"),
    }
}

/// Map a transport event onto the stream's connection state.
fn apply_link_event(state: &ConnStateTracker, event: LinkEvent) {
    match event {
        LinkEvent::Connecting => {
            state.transition(ConnState::Connecting, None);
        }
        LinkEvent::Open => {
            state.transition(ConnState::Ready, None);
        }
        LinkEvent::Closed { cause: Some(cause) } => {
            state.transition(ConnState::Failed, Some(&cause));
        }
        LinkEvent::Closed { cause: None } | LinkEvent::Exhausted => {
            state.transition(ConnState::Disconnected, None);
        }
    }
}

/// Connect, print until `interrupt` resolves, then close.
pub async fn run_stream<I>(cli: &StreamCli, interrupt: I) -> Result<()>
where
    I: Future<Output = ()>,
{
    let config = config::load_or_default(cli.config.as_deref())?;
    let raw_url = cli.url.clone().unwrap_or_else(|| config.stream_url.clone());
    let url = parse_stream_url(&raw_url)?;

    let state = Arc::new(ConnStateTracker::new(Arc::new(|from, to, cause| {
        println!("{}", render_transition(from, to, cause));
    })));

    let mut conn_config = WsConnConfig::from_app(url.as_str(), &config);
    if !cli.subs.is_empty() {
        let msg = subscribe_message(&config.api_key, &cli.subs);
        conn_config = conn_config.with_handshake(Arc::new(move || msg.clone()));
    }
    info!("[stream] {} subscription(s): {:?}", cli.subs.len(), cli.subs);

    let detailed = cli.detailed;
    let link_state = Arc::clone(&state);
    let mut conn = WsConnection::new(conn_config);
    println!("Connecting to {url} ...");
    conn.start(
        Arc::new(move |_, text| println!("Received message: {}\n", render_message(text, detailed))),
        Arc::new(move |_, event| apply_link_event(&link_state, event)),
    );

    interrupt.await;
    println!("Closing connection...");
    state.transition(ConnState::Disconnecting, None);
    let closed = conn.stop().await.context("failed to close connection");
    state.transition(ConnState::Disconnected, None);
    debug!("[stream] connection stopped");
    closed
}
