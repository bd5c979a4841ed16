//! # strand-td
//!
//! Trading sessions for the strand client.
//!
//! Each session implements the [`TradeSession`] trait, which provides a
//! uniform interface for the connection lifecycle, its event stream, and the
//! one-shot trading operations. The lifecycle is:
//! `subscribe()` → `connect()` → wait for [`SessionEvent::Ready`] → order
//! operations → `close()`.
//!
//! ## Implementations
//!
//! | Session          | Module | Transport                                  |
//! |------------------|--------|--------------------------------------------|
//! | `WsTradeSession` | `ws`   | JSON over one authenticated WebSocket      |
//! | `MockSession`    | `mock` | in-memory script (feature `testkit`)       |

pub mod event;
#[cfg(any(test, feature = "testkit"))]
pub mod mock;
pub mod ws;

use anyhow::Result;
use async_trait::async_trait;
use strand_core::trading::*;

pub use event::{EventHub, EventSubscription, SessionEvent};

/// Trait implemented by all trading sessions.
///
/// # Lifecycle
///
/// 1. Construct via the implementation's `new(...)`.
/// 2. [`subscribe`](TradeSession::subscribe) to the event stream *before*
///    connecting, so no transition is missed.
/// 3. Call [`connect`](TradeSession::connect); it returns as soon as the
///    connection task is running. Progress is reported as
///    [`SessionEvent::StateChanged`] and finally [`SessionEvent::Ready`].
/// 4. Use the order operations once ready.
/// 5. Call [`close`](TradeSession::close) to shut the connection down.
///
/// All methods take `&self` so the session can be shared behind an `Arc`
/// between the task that drives it and the task that closes it.
#[async_trait]
pub trait TradeSession: Send + Sync {
    /// Open a new, independently cancellable event subscription.
    fn subscribe(&self) -> EventSubscription;

    /// Start connecting. Does not wait for the network.
    async fn connect(&self) -> Result<()>;

    /// Close the connection.
    ///
    /// Safe to call on a session that never connected, failed to connect, or
    /// is already closed.
    async fn close(&self) -> Result<()>;

    /// Query the open orders on a market.
    async fn get_orders(&self, market_id: MarketId) -> Result<Vec<Order>>;

    /// Query account balances.
    async fn get_balances(&self) -> Result<Balances>;

    /// Submit a new order and return it as accepted by the service.
    async fn place_order(&self, params: &PlaceOrderParams) -> Result<Order>;

    /// Cancel an existing order.
    async fn cancel_order(&self, params: &CancelOrderParams) -> Result<()>;
}
