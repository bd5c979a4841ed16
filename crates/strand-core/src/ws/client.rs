//! Single WebSocket connection with auto-reconnect and ping keep-alive.
//!
//! Each `WsConnection` runs as a tokio task that:
//! 1. Connects to the service WebSocket endpoint (TLS).
//! 2. Sends the handshake message (built fresh for every attempt).
//! 3. Reads messages and forwards them to a callback.
//! 4. Sends periodic WebSocket pings.
//! 5. Reconnects on disconnection with exponential backoff, unless disabled.
//!
//! Link lifecycle changes are reported through [`LinkEvent`]s; the owner
//! decides what they mean for its own connection state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, ReconnectConfig};

/// Callback invoked for each received text message.
///
/// Parameters: `(connection_id, message_text)`
pub type OnMessageCallback = Arc<dyn Fn(usize, &str) + Send + Sync>;

/// Callback invoked on every link lifecycle change.
pub type OnLinkCallback = Arc<dyn Fn(usize, LinkEvent) + Send + Sync>;

/// Builds the first message sent after every successful connect.
pub type HandshakeFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Transport-level lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A connection attempt is starting.
    Connecting,
    /// The socket is open and the handshake message (if any) was sent.
    Open,
    /// The link went down. `cause` is `None` for a clean close by the peer.
    Closed { cause: Option<String> },
    /// The transport gave up and will not reconnect.
    Exhausted,
}

/// Configuration for a single WebSocket connection.
#[derive(Clone)]
pub struct WsConnConfig {
    /// Full WebSocket URL (e.g. `wss://trade.strand.example/v1`).
    pub url: String,
    /// Message to send immediately after each connect (auth / subscription).
    pub handshake: Option<HandshakeFn>,
    /// Interval between ping frames.
    pub ping_interval: Option<Duration>,
    /// Reconnect after the link drops.
    pub reconnect: bool,
    /// First reconnect delay.
    pub initial_backoff: Duration,
    /// Reconnect delay ceiling.
    pub max_backoff: Duration,
    /// Connection identifier, used as the log prefix.
    pub id: usize,
}

impl WsConnConfig {
    /// Build a connection config for `url` from the application settings.
    pub fn from_app(url: &str, app: &AppConfig) -> Self {
        let reconnect: &ReconnectConfig = &app.reconnect;
        let initial_ms = reconnect.initial_backoff_ms.max(1);
        Self {
            url: url.to_string(),
            handshake: None,
            ping_interval: app.ping_interval(),
            reconnect: reconnect.enabled,
            initial_backoff: Duration::from_millis(initial_ms),
            max_backoff: Duration::from_millis(reconnect.max_backoff_ms.max(initial_ms)),
            id: 0,
        }
    }

    /// Set the handshake builder.
    pub fn with_handshake(mut self, handshake: HandshakeFn) -> Self {
        self.handshake = Some(handshake);
        self
    }
}

impl fmt::Debug for WsConnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsConnConfig")
            .field("url", &self.url)
            .field("handshake", &self.handshake.is_some())
            .field("ping_interval", &self.ping_interval)
            .field("reconnect", &self.reconnect)
            .field("id", &self.id)
            .finish()
    }
}

/// A single WebSocket connection managed by a background tokio task.
pub struct WsConnection {
    /// Connection configuration.
    pub config: WsConnConfig,
    /// Channel to send outbound messages.
    outbound_tx: Option<mpsc::Sender<String>>,
    /// Shutdown signal sender.
    shutdown_tx: Option<watch::Sender<bool>>,
    /// Task join handle.
    task: Option<tokio::task::JoinHandle<()>>,
}

impl WsConnection {
    /// Create a new (not yet started) connection.
    pub fn new(config: WsConnConfig) -> Self {
        Self {
            config,
            outbound_tx: None,
            shutdown_tx: None,
            task: None,
        }
    }

    /// Start the connection task. Returns immediately.
    pub fn start(&mut self, on_text: OnMessageCallback, on_link: OnLinkCallback) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outbound_tx, outbound_rx) = mpsc::channel::<String>(64);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            connection_loop(config, on_text, on_link, outbound_rx, shutdown_rx).await;
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.outbound_tx = Some(outbound_tx);
        self.task = Some(task);
    }

    /// Whether [`start`](Self::start) was called and [`stop`](Self::stop) was not.
    pub fn is_started(&self) -> bool {
        self.task.is_some()
    }

    /// A clonable handle for sending text frames from other tasks.
    pub fn sender(&self) -> Option<mpsc::Sender<String>> {
        self.outbound_tx.clone()
    }

    /// Send a text message on this connection.
    pub async fn send(&self, msg: String) -> anyhow::Result<()> {
        if let Some(tx) = &self.outbound_tx {
            tx.send(msg).await?;
        }
        Ok(())
    }

    /// Stop the connection and wait for the task to finish.
    pub async fn stop(&mut self) -> anyhow::Result<()> {
        self.outbound_tx = None;
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }
}

/// Main connection loop: connects, handshakes, reads, pings, reconnects.
async fn connection_loop(
    config: WsConnConfig,
    on_text: OnMessageCallback,
    on_link: OnLinkCallback,
    mut outbound_rx: mpsc::Receiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut backoff = config.initial_backoff;
    let conn_id = config.id;

    loop {
        // Check shutdown before connecting
        if *shutdown_rx.borrow() {
            info!("[ws-{conn_id}] shutdown requested");
            return;
        }

        info!("[ws-{conn_id}] connecting to {}", config.url);
        on_link(conn_id, LinkEvent::Connecting);

        let connected = tokio::select! {
            res = tokio_tungstenite::connect_async(config.url.as_str()) => res,
            _ = shutdown_rx.changed() => return,
        };

        let cause = match connected {
            Ok((ws_stream, _response)) => {
                backoff = config.initial_backoff;
                info!("[ws-{conn_id}] connected");
                match run_session(&config, ws_stream, &on_text, &on_link, &mut outbound_rx, &mut shutdown_rx)
                    .await
                {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Dropped(cause) => cause,
                }
            }
            Err(e) => {
                error!("[ws-{conn_id}] connection failed: {e}");
                Some(format!("connection failed: {e}"))
            }
        };

        on_link(conn_id, LinkEvent::Closed { cause });

        if !config.reconnect {
            warn!("[ws-{conn_id}] disconnected, reconnect disabled");
            on_link(conn_id, LinkEvent::Exhausted);
            return;
        }

        warn!("[ws-{conn_id}] disconnected, reconnecting in {backoff:?}");
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {},
            _ = shutdown_rx.changed() => return,
        }
        backoff = (backoff * 2).min(config.max_backoff);
    }
}

enum SessionEnd {
    Shutdown,
    Dropped(Option<String>),
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Drive one established socket until it drops or shutdown is requested.
async fn run_session(
    config: &WsConnConfig,
    ws_stream: WsStream,
    on_text: &OnMessageCallback,
    on_link: &OnLinkCallback,
    outbound_rx: &mut mpsc::Receiver<String>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let conn_id = config.id;
    let (mut ws_write, mut ws_read) = ws_stream.split();

    if let Some(handshake) = &config.handshake {
        let msg = handshake();
        debug!("[ws-{conn_id}] sending handshake");
        if let Err(e) = ws_write.send(Message::Text(msg.into())).await {
            error!("[ws-{conn_id}] handshake send failed: {e}");
            return SessionEnd::Dropped(Some(format!("handshake send failed: {e}")));
        }
    }
    on_link(conn_id, LinkEvent::Open);

    // First ping one full period after the handshake.
    let mut ping_timer = config.ping_interval.map(|period| {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                info!("[ws-{conn_id}] shutdown signal received");
                let _ = ws_write.close().await;
                return SessionEnd::Shutdown;
            }

            msg = ws_read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        on_text(conn_id, &text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        warn!("[ws-{conn_id}] received close frame: {frame:?}");
                        return SessionEnd::Dropped(None);
                    }
                    Some(Err(e)) => {
                        error!("[ws-{conn_id}] read error: {e}");
                        return SessionEnd::Dropped(Some(format!("read error: {e}")));
                    }
                    None => {
                        warn!("[ws-{conn_id}] stream ended");
                        return SessionEnd::Dropped(None);
                    }
                    _ => {} // Binary, Pong, Frame — ignore
                }
            }

            Some(msg) = outbound_rx.recv() => {
                if let Err(e) = ws_write.send(Message::Text(msg.into())).await {
                    error!("[ws-{conn_id}] send error: {e}");
                    return SessionEnd::Dropped(Some(format!("send error: {e}")));
                }
            }

            _ = next_ping(&mut ping_timer) => {
                if let Err(e) = ws_write.send(Message::Ping(Vec::new().into())).await {
                    error!("[ws-{conn_id}] ping send error: {e}");
                    return SessionEnd::Dropped(Some(format!("ping send error: {e}")));
                }
            }
        }
    }
}

/// Next keep-alive tick; never resolves when pinging is disabled.
async fn next_ping(timer: &mut Option<Interval>) {
    match timer {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn from_app_copies_reconnect_policy() {
        let mut app = AppConfig::default();
        app.reconnect.enabled = false;
        app.reconnect.initial_backoff_ms = 250;
        app.reconnect.max_backoff_ms = 100;
        app.ping_interval_secs = 0;

        let cfg = WsConnConfig::from_app("wss://example.test/ws", &app);
        assert!(!cfg.reconnect);
        assert_eq!(cfg.initial_backoff, Duration::from_millis(250));
        // Ceiling never drops below the first delay.
        assert_eq!(cfg.max_backoff, Duration::from_millis(250));
        assert_eq!(cfg.ping_interval, None);
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_failure_and_gives_up() {
        let mut app = AppConfig::default();
        app.reconnect.enabled = false;
        let cfg = WsConnConfig::from_app("ws://127.0.0.1:1/unreachable", &app);

        let events: Arc<Mutex<Vec<LinkEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let done_tx = Mutex::new(Some(done_tx));

        let mut conn = WsConnection::new(cfg);
        conn.start(
            Arc::new(|_, _| {}),
            Arc::new(move |_, ev| {
                let last = ev == LinkEvent::Exhausted;
                sink.lock().unwrap().push(ev);
                if last {
                    if let Some(tx) = done_tx.lock().unwrap().take() {
                        let _ = tx.send(());
                    }
                }
            }),
        );

        tokio::time::timeout(Duration::from_secs(5), done_rx).await.unwrap().unwrap();
        conn.stop().await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events[0], LinkEvent::Connecting);
        assert!(matches!(&events[1], LinkEvent::Closed { cause: Some(c) } if c.starts_with("connection failed")));
        assert_eq!(events[2], LinkEvent::Exhausted);
    }

    #[tokio::test]
    async fn idle_link_sends_keepalive_pings() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let mut pings = 0;
            let deadline = tokio::time::sleep(Duration::from_millis(750));
            tokio::pin!(deadline);
            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    msg = ws.next() => match msg {
                        Some(Ok(Message::Ping(_))) => pings += 1,
                        Some(Ok(_)) => {}
                        _ => break,
                    },
                }
            }
            pings
        });

        let mut cfg = WsConnConfig::from_app(&format!("ws://{addr}"), &AppConfig::default());
        cfg.ping_interval = Some(Duration::from_millis(100));
        cfg.reconnect = false;
        let mut conn = WsConnection::new(cfg);
        conn.start(Arc::new(|_, _| {}), Arc::new(|_, _| {}));

        let pings = server.await.unwrap();
        conn.stop().await.unwrap();
        assert!(pings >= 3, "only {pings} ping(s) in 750ms");
    }

    #[tokio::test]
    async fn stop_before_start_is_a_no_op() {
        let mut conn = WsConnection::new(WsConnConfig::from_app("ws://127.0.0.1:1", &AppConfig::default()));
        assert!(!conn.is_started());
        conn.stop().await.unwrap();
        conn.stop().await.unwrap();
    }
}
