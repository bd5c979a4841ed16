//! Trading-related data structures: market ids, orders and balances.
//!
//! Prices and amounts are [`Decimal`]s and travel as decimal strings on the
//! wire, so `"0.01"` is exactly `0.01` end to end.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::enums::{OrderSide, OrderStatus, OrderType};

// ---------------------------------------------------------------------------
// Market identity
// ---------------------------------------------------------------------------

/// Opaque identifier of the market a session trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(pub u64);

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Requests (client → service)
// ---------------------------------------------------------------------------

/// Parameters for a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderParams {
    pub market_id: MarketId,
    pub side: OrderSide,
    pub order_type: OrderType,
    /// Limit price; `None` for market orders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    pub amount: Decimal,
}

impl fmt::Display for PlaceOrderParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} on market {}", self.side, self.order_type, self.amount, self.market_id)?;
        if let Some(price) = self.price {
            write!(f, " @ {price}")?;
        }
        Ok(())
    }
}

/// Parameters for cancelling one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrderParams {
    pub market_id: MarketId,
    pub order_id: String,
}

// ---------------------------------------------------------------------------
// Responses (service → client)
// ---------------------------------------------------------------------------

/// An order as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Exchange-assigned order id.
    pub id: String,
    pub market_id: MarketId,
    pub side: OrderSide,
    pub order_type: OrderType,
    #[serde(default)]
    pub price: Option<Decimal>,
    pub amount: Decimal,
    #[serde(default)]
    pub filled_amount: Decimal,
    #[serde(default)]
    pub status: OrderStatus,
}

/// Account balances keyed by currency symbol.
pub type Balances = BTreeMap<String, Decimal>;
