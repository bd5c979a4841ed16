//! The one command a `strand-trade` run executes.
//!
//! [`CommandRequest`] is built and validated before any connection exists.
//! [`CommandDispatcher`] runs it against a ready session exactly once and
//! turns the response into a printable [`Report`].

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use strand_core::error::StrandError;
use strand_core::trading::*;
use strand_td::TradeSession;
use tracing::info;

/// Command selector given by `--mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    List,
    Balances,
    Place,
    Cancel,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::List, Mode::Balances, Mode::Place, Mode::Cancel];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::List => "list",
            Mode::Balances => "balances",
            Mode::Place => "place",
            Mode::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = StrandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| StrandError::UnknownMode(s.to_string()))
    }
}

/// A fully validated command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    List,
    Balances,
    Place(PlaceOrderParams),
    Cancel(CancelOrderParams),
}

impl Command {
    pub fn mode(&self) -> Mode {
        match self {
            Command::List => Mode::List,
            Command::Balances => Mode::Balances,
            Command::Place(_) => Mode::Place,
            Command::Cancel(_) => Mode::Cancel,
        }
    }
}

/// The command together with the market it targets.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub market_id: MarketId,
    pub command: Command,
}

impl CommandRequest {
    pub fn list(market_id: MarketId) -> Self {
        Self { market_id, command: Command::List }
    }

    pub fn balances(market_id: MarketId) -> Self {
        Self { market_id, command: Command::Balances }
    }

    /// A place request; the params' market is forced to `market_id`.
    pub fn place(market_id: MarketId, mut params: PlaceOrderParams) -> Self {
        params.market_id = market_id;
        Self { market_id, command: Command::Place(params) }
    }

    pub fn cancel(market_id: MarketId, order_id: impl Into<String>) -> Self {
        Self {
            market_id,
            command: Command::Cancel(CancelOrderParams { market_id, order_id: order_id.into() }),
        }
    }
}

impl fmt::Display for CommandRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.command {
            Command::List => write!(f, "list orders on market {}", self.market_id),
            Command::Balances => write!(f, "get balances"),
            Command::Place(p) => write!(f, "place {p}"),
            Command::Cancel(c) => write!(f, "cancel order {} on market {}", c.order_id, c.market_id),
        }
    }
}

/// Printable result of a successful command.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Orders { market_id: MarketId, orders: Vec<Order> },
    Balances(Balances),
    /// The service-assigned id with the order as submitted.
    Placed { order_id: String, params: PlaceOrderParams },
    Cancelled { order_id: String },
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Orders { market_id, orders } => {
                let ids: Vec<&str> = orders.iter().map(|o| o.id.as_str()).collect();
                write!(f, "Orders on market {market_id}: [{}]", ids.join(", "))
            }
            Report::Balances(balances) if balances.is_empty() => write!(f, "Balances: (none)"),
            Report::Balances(balances) => {
                write!(f, "Balances:")?;
                for (currency, amount) in balances {
                    write!(f, "\n  {currency}: {amount}")?;
                }
                Ok(())
            }
            Report::Placed { order_id, params } => {
                write!(f, "Order placed: {order_id} ({} {} {}", params.side, params.order_type, params.amount)?;
                if let Some(price) = params.price {
                    write!(f, " @ {price}")?;
                }
                write!(f, ")")
            }
            Report::Cancelled { order_id } => write!(f, "Order canceled: {order_id}"),
        }
    }
}

/// Runs a [`CommandRequest`] at most once.
pub struct CommandDispatcher {
    request: CommandRequest,
    dispatched: AtomicBool,
}

impl CommandDispatcher {
    pub fn new(request: CommandRequest) -> Self {
        Self { request, dispatched: AtomicBool::new(false) }
    }

    pub fn request(&self) -> &CommandRequest {
        &self.request
    }

    /// Whether [`dispatch`](Self::dispatch) has been called.
    pub fn has_dispatched(&self) -> bool {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Execute the command against a ready session.
    ///
    /// A second call fails without touching the session.
    pub async fn dispatch(&self, session: &dyn TradeSession) -> Result<Report> {
        if self.dispatched.swap(true, Ordering::SeqCst) {
            bail!("command already dispatched");
        }

        let market_id = self.request.market_id;
        match &self.request.command {
            Command::List => {
                info!("[dispatch] trading ready: getting orders...");
                let orders = session
                    .get_orders(market_id)
                    .await
                    .with_context(|| format!("get orders on market {market_id} failed"))?;
                Ok(Report::Orders { market_id, orders })
            }
            Command::Balances => {
                info!("[dispatch] trading ready: getting balances...");
                let balances = session.get_balances().await.context("get balances failed")?;
                Ok(Report::Balances(balances))
            }
            Command::Place(params) => {
                info!("[dispatch] trading ready: placing order {params}...");
                let order = session.place_order(params).await.context("place order failed")?;
                Ok(Report::Placed { order_id: order.id, params: params.clone() })
            }
            Command::Cancel(params) => {
                info!("[dispatch] trading ready: canceling order {}...", params.order_id);
                session
                    .cancel_order(params)
                    .await
                    .with_context(|| format!("cancel order {} failed", params.order_id))?;
                Ok(Report::Cancelled { order_id: params.order_id.clone() })
            }
        }
    }
}
