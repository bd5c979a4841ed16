//! JSON frames exchanged with the trading service.
//!
//! # Client → service
//!
//! | Frame     | Shape                                                         |
//! |-----------|---------------------------------------------------------------|
//! | `auth`    | `{type, api_key, nonce, signature, markets: [{market_id, exchange_key?, exchange_secret?}]}` |
//! | `request` | `{type, id, method, params}`                                  |
//!
//! # Service → client
//!
//! | Frame                 | Meaning                                   |
//! |-----------------------|-------------------------------------------|
//! | `auth_ok`             | handshake accepted, session ready         |
//! | `auth_error`          | handshake refused                         |
//! | `subscription_result` | per-market subscriptions that failed      |
//! | `response`            | result or error for a request `id`        |
//! | `error`               | asynchronous error, possibly fatal        |

use serde::Deserialize;
use serde_json::{Value, json};
use strand_core::MarketId;

use super::auth;

/// Request methods.
pub mod method {
    pub const ORDERS_LIST: &str = "orders.list";
    pub const BALANCES_GET: &str = "balances.get";
    pub const ORDER_PLACE: &str = "order.place";
    pub const ORDER_CANCEL: &str = "order.cancel";
}

/// Exchange credentials forwarded for one market.
///
/// When absent the service falls back to credentials it stores itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeAuth {
    pub api_key: String,
    pub api_secret: String,
}

/// One market the session trades on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketParams {
    pub market_id: MarketId,
    pub exchange_auth: Option<ExchangeAuth>,
}

/// Build a signed `auth` frame with a fresh nonce.
pub fn auth_message(api_key: &str, secret_key: &str, markets: &[MarketParams]) -> String {
    let nonce = auth::nonce();
    let signature = auth::hmac_sha256_sign(secret_key, &nonce);
    let markets: Vec<Value> = markets
        .iter()
        .map(|m| {
            let mut v = json!({ "market_id": m.market_id });
            if let Some(ea) = &m.exchange_auth {
                v["exchange_key"] = json!(ea.api_key);
                v["exchange_secret"] = json!(ea.api_secret);
            }
            v
        })
        .collect();

    json!({
        "type": "auth",
        "api_key": api_key,
        "nonce": nonce,
        "signature": signature,
        "markets": markets,
    })
    .to_string()
}

/// Build a `request` frame.
pub fn request_message(id: &str, method: &str, params: Value) -> String {
    json!({
        "type": "request",
        "id": id,
        "method": method,
        "params": params,
    })
    .to_string()
}

/// A frame received from the service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthOk,
    AuthError {
        message: String,
    },
    SubscriptionResult {
        #[serde(default)]
        failed: Vec<String>,
    },
    Response {
        id: String,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        message: String,
        #[serde(default)]
        disconnecting: bool,
        #[serde(default)]
        market_id: Option<MarketId>,
    },
    /// Any frame type this client does not know about (heartbeats, ...).
    #[serde(other)]
    Unknown,
}
