//! Scripted in-memory [`TradeSession`] for tests.
//!
//! The script decides when (or whether) the session becomes ready, whether
//! an error or a silent drop happens on the way, and what each trading call
//! returns. Every interaction is counted so tests can assert on
//! `connect()`/`close()` calls and on calls made before readiness.
//!
//! ```ignore
//! let session = Arc::new(
//!     MockSession::new()
//!         .ready_after(Duration::from_millis(5))
//!         .with_orders(&["A1", "A2"]),
//! );
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use strand_core::error::StrandError;
use strand_core::trading::*;
use strand_core::ws::ConnStateTracker;
use strand_core::{ConnState, OrderSide, OrderStatus, OrderType};
use tokio::task::JoinHandle;

use crate::event::{EventHub, EventSubscription, SessionEvent};

/// What the mock does after `connect()`.
#[derive(Debug, Clone)]
struct Script {
    ready_after: Option<Duration>,
    ready_on_connect: bool,
    error_after: Option<(Duration, String, bool)>,
    drop_after: Option<Duration>,
    connect_error: Option<String>,
    close_error: Option<String>,
    call_latency: Duration,
    orders: Vec<Order>,
    balances: Balances,
    place_rejection: Option<String>,
    cancel_rejection: Option<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            ready_after: Some(Duration::from_millis(5)),
            ready_on_connect: false,
            error_after: None,
            drop_after: None,
            connect_error: None,
            close_error: None,
            call_latency: Duration::ZERO,
            orders: Vec::new(),
            balances: Balances::new(),
            place_rejection: None,
            cancel_rejection: None,
        }
    }
}

/// Hub and state tracker, shared with the scripted timer tasks.
struct Shared {
    hub: Arc<EventHub>,
    state: ConnStateTracker,
}

/// Scripted session. Build it with the chained setters, then share it in an `Arc`.
pub struct MockSession {
    script: Script,
    shared: Arc<Shared>,
    connect_calls: AtomicUsize,
    close_calls: AtomicUsize,
    calls_before_ready: AtomicUsize,
    calls: Mutex<Vec<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSession {
    /// A session that becomes ready 5ms after `connect()` and has no orders.
    pub fn new() -> Self {
        let hub = EventHub::new();
        let hub_for_state = Arc::clone(&hub);
        let state = ConnStateTracker::new(Arc::new(move |from, to, cause| {
            hub_for_state.publish(SessionEvent::StateChanged {
                from,
                to,
                cause: cause.map(str::to_string),
            });
        }));
        Self {
            script: Script::default(),
            shared: Arc::new(Shared { hub, state }),
            connect_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            calls_before_ready: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    // -- script --

    pub fn ready_after(mut self, delay: Duration) -> Self {
        self.script.ready_after = Some(delay);
        self
    }

    pub fn never_ready(mut self) -> Self {
        self.script.ready_after = None;
        self.script.ready_on_connect = false;
        self
    }

    /// Publish `Ready` before `connect()` returns.
    pub fn ready_on_connect(mut self) -> Self {
        self.script.ready_after = None;
        self.script.ready_on_connect = true;
        self
    }

    /// Publish an error `delay` after connect. A disconnecting error also
    /// moves the session to `Failed`.
    pub fn error_after(mut self, delay: Duration, message: &str, disconnecting: bool) -> Self {
        self.script.error_after = Some((delay, message.to_string(), disconnecting));
        self
    }

    /// Drop to `Disconnected` without any error, if not ready by then.
    pub fn drop_after(mut self, delay: Duration) -> Self {
        self.script.drop_after = Some(delay);
        self
    }

    pub fn fail_connect(mut self, message: &str) -> Self {
        self.script.connect_error = Some(message.to_string());
        self
    }

    pub fn fail_close(mut self, message: &str) -> Self {
        self.script.close_error = Some(message.to_string());
        self
    }

    /// How long every trading call takes.
    pub fn call_latency(mut self, latency: Duration) -> Self {
        self.script.call_latency = latency;
        self
    }

    /// Open orders returned by `get_orders`, one per id.
    pub fn with_orders(mut self, ids: &[&str]) -> Self {
        self.script.orders = ids
            .iter()
            .map(|id| Order {
                id: (*id).to_string(),
                market_id: MarketId(1),
                side: Default::default(),
                order_type: Default::default(),
                price: Some(Decimal::ONE),
                amount: Decimal::ONE,
                filled_amount: Decimal::ZERO,
                status: OrderStatus::Open,
            })
            .collect();
        self
    }

    pub fn with_balances(mut self, balances: Balances) -> Self {
        self.script.balances = balances;
        self
    }

    pub fn reject_place(mut self, message: &str) -> Self {
        self.script.place_rejection = Some(message.to_string());
        self
    }

    pub fn reject_cancel(mut self, message: &str) -> Self {
        self.script.cancel_rejection = Some(message.to_string());
        self
    }

    // -- observations --

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Trading calls made before `Ready` was published.
    pub fn calls_before_ready(&self) -> usize {
        self.calls_before_ready.load(Ordering::SeqCst)
    }

    /// Names of the trading calls made, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn state(&self) -> ConnState {
        self.shared.state.current()
    }

    // -- internals --

    async fn record(&self, name: &str) {
        if !self.shared.hub.has_been_ready() {
            self.calls_before_ready.fetch_add(1, Ordering::SeqCst);
        }
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(name.to_string());
        if !self.script.call_latency.is_zero() {
            tokio::time::sleep(self.script.call_latency).await;
        }
    }

    fn spawn_after<F>(&self, delay: Duration, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).push(task);
    }
}

#[async_trait]
impl crate::TradeSession for MockSession {
    fn subscribe(&self) -> EventSubscription {
        self.shared.hub.subscribe()
    }

    async fn connect(&self) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.script.connect_error {
            return Err(StrandError::WebSocket(message.clone()).into());
        }

        let shared = &self.shared;
        shared.state.transition(ConnState::Connecting, None);
        shared.state.transition(ConnState::Authenticating, None);
        if self.script.ready_on_connect && shared.state.transition(ConnState::Ready, None) {
            shared.hub.publish(SessionEvent::Ready);
        }

        if let Some(delay) = self.script.ready_after {
            let s = Arc::clone(shared);
            self.spawn_after(delay, move || {
                if s.state.transition_from(&[ConnState::Authenticating], ConnState::Ready, None) {
                    s.hub.publish(SessionEvent::Ready);
                }
            });
        }
        if let Some((delay, message, disconnecting)) = self.script.error_after.clone() {
            let s = Arc::clone(shared);
            self.spawn_after(delay, move || {
                s.hub.publish(SessionEvent::Error {
                    market_id: None,
                    message: message.clone(),
                    disconnecting,
                });
                if disconnecting {
                    s.state.transition(ConnState::Failed, Some(&message));
                }
            });
        }
        if let Some(delay) = self.script.drop_after {
            let s = Arc::clone(shared);
            self.spawn_after(delay, move || {
                s.state.transition_from(
                    &[ConnState::Connecting, ConnState::Authenticating],
                    ConnState::Disconnected,
                    None,
                );
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.close_calls.fetch_add(1, Ordering::SeqCst) > 0 {
            return Ok(());
        }
        for task in self.tasks.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            task.abort();
        }
        let shared = &self.shared;
        if !shared.state.current().is_down() {
            shared.state.transition(ConnState::Disconnecting, None);
        }
        shared.state.transition(ConnState::Disconnected, None);
        shared.hub.close();

        match &self.script.close_error {
            Some(message) => Err(StrandError::WebSocket(message.clone()).into()),
            None => Ok(()),
        }
    }

    async fn get_orders(&self, market_id: MarketId) -> Result<Vec<Order>> {
        self.record("get_orders").await;
        Ok(self
            .script
            .orders
            .iter()
            .cloned()
            .map(|mut o| {
                o.market_id = market_id;
                o
            })
            .collect())
    }

    async fn get_balances(&self) -> Result<Balances> {
        self.record("get_balances").await;
        Ok(self.script.balances.clone())
    }

    async fn place_order(&self, params: &PlaceOrderParams) -> Result<Order> {
        self.record("place_order").await;
        if let Some(message) = &self.script.place_rejection {
            return Err(StrandError::Trading(message.clone()).into());
        }
        // A bare acknowledgement: only the id and market are meaningful.
        Ok(Order {
            id: "O-1".into(),
            market_id: params.market_id,
            side: OrderSide::default(),
            order_type: OrderType::default(),
            price: None,
            amount: Decimal::ZERO,
            filled_amount: Decimal::ZERO,
            status: OrderStatus::Open,
        })
    }

    async fn cancel_order(&self, _params: &CancelOrderParams) -> Result<()> {
        self.record("cancel_order").await;
        match &self.script.cancel_rejection {
            Some(message) => Err(StrandError::Trading(message.clone()).into()),
            None => Ok(()),
        }
    }
}
