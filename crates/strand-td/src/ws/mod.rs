//! WebSocket trading session.
//!
//! Implements the [`TradeSession`](crate::TradeSession) trait over a single
//! authenticated WebSocket connection.
//!
//! # Architecture
//!
//! ```text
//! WsTradeSession
//! ├── WsConnection        (transport task: connect, auth handshake, reconnect)
//! ├── ConnStateTracker    (disconnected → connecting → authenticating → ready)
//! ├── EventHub            (state changes, ready, errors → subscribers)
//! └── pending requests    (request id → oneshot, completed by the reader)
//! ```
//!
//! Every (re)connect sends a freshly signed `auth` frame. `auth_ok` moves the
//! session to `Ready`; the hub publishes `Ready` only the first time.

pub mod auth;
pub mod protocol;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use strand_core::config::AppConfig;
use strand_core::error::StrandError;
use strand_core::trading::*;
use strand_core::ws::{ConnStateTracker, LinkEvent, WsConnConfig, WsConnection};
use strand_core::ConnState;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use self::protocol::{MarketParams, ServerMessage, method};
use crate::event::{EventHub, EventSubscription, SessionEvent};

/// Completion of one in-flight request.
#[derive(Debug, PartialEq)]
enum Reply {
    Result(Value),
    /// The service answered with an error.
    Rejected(String),
    /// The request never got an answer (link dropped, session closed).
    Lost(String),
}

type PendingMap = HashMap<String, oneshot::Sender<Reply>>;

/// State shared between the session handle and the transport callbacks.
struct Inner {
    hub: Arc<EventHub>,
    state: ConnStateTracker,
    pending: Mutex<PendingMap>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
}

impl Inner {
    fn new() -> Arc<Self> {
        let hub = EventHub::new();
        let hub_for_state = Arc::clone(&hub);
        let state = ConnStateTracker::new(Arc::new(move |from, to, cause| {
            hub_for_state.publish(SessionEvent::StateChanged {
                from,
                to,
                cause: cause.map(str::to_string),
            });
        }));
        Arc::new(Self {
            hub,
            state,
            pending: Mutex::new(HashMap::new()),
            outbound: Mutex::new(None),
        })
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, PendingMap> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn outbound(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Sender<String>>> {
        self.outbound.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Track a request awaiting its response.
    ///
    /// The state is checked again after insertion: a request registered
    /// while the link drops is either drained by `fail_pending` or refused
    /// here, never left waiting for its timeout.
    fn register(&self, method: &str, id: &str) -> Result<oneshot::Receiver<Reply>, StrandError> {
        let (tx, rx) = oneshot::channel();
        self.pending().insert(id.to_string(), tx);
        let state = self.state.current();
        if state != ConnState::Ready {
            self.pending().remove(id);
            return Err(StrandError::Session(format!("{method}: session is not ready ({state})")));
        }
        Ok(rx)
    }

    /// Fail every in-flight request.
    fn fail_pending(&self, reason: &str) {
        let drained: Vec<_> = self.pending().drain().collect();
        if !drained.is_empty() {
            warn!("[trade-session] failing {} pending request(s): {reason}", drained.len());
        }
        for (_, tx) in drained {
            let _ = tx.send(Reply::Lost(reason.to_string()));
        }
    }

    fn handle_link(&self, event: LinkEvent) {
        match event {
            LinkEvent::Connecting => {
                self.state.transition(ConnState::Connecting, None);
            }
            LinkEvent::Open => {
                self.state.transition(ConnState::Authenticating, None);
            }
            LinkEvent::Closed { cause } => {
                match cause {
                    Some(cause) => {
                        self.hub.publish(SessionEvent::Error {
                            market_id: None,
                            message: cause.clone(),
                            disconnecting: true,
                        });
                        self.state.transition(ConnState::Failed, Some(&cause));
                    }
                    None => {
                        self.state.transition(ConnState::Disconnected, None);
                    }
                }
                // After the transition, so a late registration sees the session down.
                self.fail_pending("connection lost");
            }
            LinkEvent::Exhausted => {
                debug!("[trade-session] transport gave up reconnecting");
            }
        }
    }

    fn handle_text(&self, text: &str) {
        let msg: ServerMessage = match serde_json::from_str(text) {
            Ok(m) => m,
            Err(e) => {
                warn!("[trade-session] undecodable frame: {e}");
                return;
            }
        };

        match msg {
            ServerMessage::AuthOk => {
                if self.state.transition_from(&[ConnState::Authenticating], ConnState::Ready, None) {
                    info!("[trade-session] authenticated");
                    self.hub.publish(SessionEvent::Ready);
                }
            }
            ServerMessage::AuthError { message } => {
                let message = StrandError::Auth(message).to_string();
                error!("[trade-session] {message}");
                self.hub.publish(SessionEvent::Error {
                    market_id: None,
                    message: message.clone(),
                    disconnecting: true,
                });
                self.state.transition(ConnState::Failed, Some(&message));
            }
            ServerMessage::SubscriptionResult { failed } => {
                self.hub.publish(SessionEvent::SubscriptionResult { failed });
            }
            ServerMessage::Response { id, result, error } => {
                let Some(tx) = self.pending().remove(&id) else {
                    debug!("[trade-session] response for unknown request {id}");
                    return;
                };
                let reply = match error {
                    Some(e) => Reply::Rejected(e),
                    None => Reply::Result(result.unwrap_or(Value::Null)),
                };
                let _ = tx.send(reply);
            }
            ServerMessage::Error {
                message,
                disconnecting,
                market_id,
            } => {
                self.hub.publish(SessionEvent::Error {
                    market_id,
                    message,
                    disconnecting,
                });
            }
            ServerMessage::Unknown => {
                debug!("[trade-session] ignoring frame: {text}");
            }
        }
    }
}

/// Trading session over one authenticated WebSocket connection.
pub struct WsTradeSession {
    inner: Arc<Inner>,
    conn: tokio::sync::Mutex<Option<WsConnection>>,
    conn_config: WsConnConfig,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl WsTradeSession {
    /// Create a new session (no connection opened yet).
    pub fn new(config: &AppConfig, markets: Vec<MarketParams>) -> Self {
        let api_key = config.api_key.clone();
        let secret_key = config.secret_key.clone();
        let conn_config = WsConnConfig::from_app(&config.trade_url, config).with_handshake(
            Arc::new(move || protocol::auth_message(&api_key, &secret_key, &markets)),
        );

        Self {
            inner: Inner::new(),
            conn: tokio::sync::Mutex::new(None),
            conn_config,
            request_timeout: config.request_timeout(),
            closed: AtomicBool::new(false),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnState {
        self.inner.state.current()
    }

    /// Send one request and wait for its response.
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let state = self.inner.state.current();
        if state != ConnState::Ready {
            return Err(StrandError::Session(format!("{method}: session is not ready ({state})")).into());
        }
        let sender = self
            .inner
            .outbound()
            .clone()
            .ok_or_else(|| StrandError::Session(format!("{method}: not connected")))?;

        let id = Uuid::new_v4().to_string();
        let rx = self.inner.register(method, &id)?;

        debug!("[trade-session] -> {method} id={id}");
        if sender.send(protocol::request_message(&id, method, params)).await.is_err() {
            self.inner.pending().remove(&id);
            return Err(StrandError::Session(format!("{method}: send channel closed")).into());
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(Reply::Result(value))) => Ok(value),
            Ok(Ok(Reply::Rejected(rejection))) => Err(StrandError::Trading(rejection).into()),
            Ok(Ok(Reply::Lost(reason))) => Err(StrandError::Session(format!("{method}: {reason}")).into()),
            Ok(Err(_)) => Err(StrandError::Session(format!("{method}: response channel dropped")).into()),
            Err(_) => {
                self.inner.pending().remove(&id);
                Err(StrandError::Session(format!(
                    "{method}: no response within {:?}",
                    self.request_timeout
                ))
                .into())
            }
        }
    }

    async fn request_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.request(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| StrandError::Parse(format!("{method}: {e}")))
            .context("unexpected response shape")
    }
}

#[async_trait]
impl crate::TradeSession for WsTradeSession {
    fn subscribe(&self) -> EventSubscription {
        self.inner.hub.subscribe()
    }

    async fn connect(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StrandError::Session("session is closed".into()).into());
        }
        let mut guard = self.conn.lock().await;
        if guard.is_some() {
            return Err(StrandError::Session("connect called twice".into()).into());
        }

        let on_text_inner = Arc::clone(&self.inner);
        let on_link_inner = Arc::clone(&self.inner);
        let mut conn = WsConnection::new(self.conn_config.clone());
        conn.start(
            Arc::new(move |_, text| on_text_inner.handle_text(text)),
            Arc::new(move |_, event| on_link_inner.handle_link(event)),
        );

        *self.inner.outbound() = conn.sender();
        *guard = Some(conn);
        info!("[trade-session] connecting to {}", self.conn_config.url);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("[trade-session] close: already closed");
            return Ok(());
        }

        let conn = self.conn.lock().await.take();
        *self.inner.outbound() = None;

        let stopped = match conn {
            Some(mut conn) => {
                self.inner.state.transition(ConnState::Disconnecting, None);
                conn.stop().await
            }
            None => Ok(()),
        };

        self.inner.fail_pending("session closed");
        self.inner.state.transition(ConnState::Disconnected, None);
        self.inner.hub.close();
        info!("[trade-session] closed");
        stopped.context("failed to stop the connection task")
    }

    async fn get_orders(&self, market_id: MarketId) -> Result<Vec<Order>> {
        self.request_as(method::ORDERS_LIST, json!({ "market_id": market_id })).await
    }

    async fn get_balances(&self) -> Result<Balances> {
        self.request_as(method::BALANCES_GET, json!({})).await
    }

    async fn place_order(&self, params: &PlaceOrderParams) -> Result<Order> {
        let order: Order = self.request_as(method::ORDER_PLACE, serde_json::to_value(params)?).await?;
        info!(
            "[trade-session] order placed: market={} {} {} amount={} -> id={}",
            params.market_id, params.side, params.order_type, params.amount, order.id,
        );
        Ok(order)
    }

    async fn cancel_order(&self, params: &CancelOrderParams) -> Result<()> {
        self.request(method::ORDER_CANCEL, serde_json::to_value(params)?).await?;
        info!(
            "[trade-session] order cancelled: market={} id={}",
            params.market_id, params.order_id,
        );
        Ok(())
    }
}
