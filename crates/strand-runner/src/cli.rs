//! Command-line arguments of `strand-trade` and their validation.

use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use rust_decimal::Decimal;
use strand_core::error::StrandError;
use strand_core::trading::{MarketId, PlaceOrderParams};
use strand_core::{OrderSide, OrderType};
use strand_td::ws::protocol::{ExchangeAuth, MarketParams};
use tracing::warn;

use crate::command::{CommandRequest, Mode};

/// One-shot strand trading client.
#[derive(Parser, Debug, Clone)]
#[command(name = "strand-trade", about = "One-shot strand trading client")]
pub struct Cli {
    /// Configuration file path (JSON).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Report every connection state change.
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to run: list, balances, place or cancel.
    #[arg(long, default_value = "")]
    pub mode: String,

    /// Market to operate on.
    #[arg(long, default_value_t = 0)]
    pub marketid: u64,

    /// Exchange API key for the market.
    #[arg(long)]
    pub exchangekey: Option<String>,

    /// Exchange API secret for the market.
    #[arg(long)]
    pub exchangesecret: Option<String>,

    /// Exchange order id (cancel).
    #[arg(long)]
    pub orderid: Option<String>,

    /// Limit price (place).
    #[arg(long)]
    pub price: Option<Decimal>,

    /// Order amount (place).
    #[arg(long)]
    pub amount: Option<Decimal>,

    /// Order side (place).
    #[arg(long, default_value_t = OrderSide::Buy)]
    pub side: OrderSide,

    /// Order type (place).
    #[arg(long = "ordertype", default_value_t = OrderType::Limit)]
    pub order_type: OrderType,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Optional log directory for file output.
    #[arg(long)]
    pub log_dir: Option<String>,
}

impl Cli {
    /// Validate the arguments into the single command to run.
    pub fn command_request(&self) -> Result<CommandRequest, StrandError> {
        if self.mode.is_empty() {
            return Err(StrandError::Config("mode is not specified".into()));
        }
        let mode: Mode = self.mode.parse()?;
        if self.marketid == 0 {
            return Err(StrandError::Config("marketid is empty".into()));
        }
        let market_id = MarketId(self.marketid);
        // Fail on half-given credentials before anything else is built.
        self.exchange_auth()?;

        match mode {
            Mode::List => Ok(CommandRequest::list(market_id)),
            Mode::Balances => Ok(CommandRequest::balances(market_id)),
            Mode::Place => Ok(CommandRequest::place(market_id, self.place_params(market_id)?)),
            Mode::Cancel => match self.orderid.as_deref().map(str::trim) {
                Some(id) if !id.is_empty() => Ok(CommandRequest::cancel(market_id, id)),
                _ => Err(StrandError::Config("orderid is empty".into())),
            },
        }
    }

    /// Per-market exchange credentials, if both halves were given.
    pub fn exchange_auth(&self) -> Result<Option<ExchangeAuth>, StrandError> {
        match (&self.exchangekey, &self.exchangesecret) {
            (Some(key), Some(secret)) => Ok(Some(ExchangeAuth {
                api_key: key.clone(),
                api_secret: secret.clone(),
            })),
            (None, None) => Ok(None),
            _ => Err(StrandError::Config(
                "exchangekey and exchangesecret must be given together".into(),
            )),
        }
    }

    /// The market subscription sent with the session handshake.
    pub fn market_params(&self) -> Result<Vec<MarketParams>, StrandError> {
        Ok(vec![MarketParams {
            market_id: MarketId(self.marketid),
            exchange_auth: self.exchange_auth()?,
        }])
    }

    /// Rendered `--help` text.
    pub fn usage() -> String {
        Self::command().render_help().to_string()
    }

    fn place_params(&self, market_id: MarketId) -> Result<PlaceOrderParams, StrandError> {
        let amount = match self.amount {
            Some(a) if a > Decimal::ZERO => a,
            Some(a) => return Err(StrandError::Config(format!("amount must be positive, got {a}"))),
            None => return Err(StrandError::Config("amount is empty".into())),
        };
        let price = match (self.order_type, self.price) {
            (OrderType::Limit, Some(p)) if p > Decimal::ZERO => Some(p),
            (OrderType::Limit, Some(p)) => {
                return Err(StrandError::Config(format!("price must be positive, got {p}")));
            }
            (OrderType::Limit, None) => {
                return Err(StrandError::Config("price is required for limit orders".into()));
            }
            (OrderType::Market, Some(p)) => {
                warn!("ignoring price {p} for market order");
                None
            }
            (OrderType::Market, None) => None,
        };
        Ok(PlaceOrderParams {
            market_id,
            side: self.side,
            order_type: self.order_type,
            price,
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use rust_decimal_macros::dec;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["strand-trade"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn list_request() {
        let cli = parse(&["--mode", "list", "--marketid", "12"]);
        assert_eq!(cli.command_request().unwrap(), CommandRequest::list(MarketId(12)));
        assert!(!cli.verbose);
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn missing_mode_and_market_are_config_errors() {
        let err = parse(&["--marketid", "1"]).command_request().unwrap_err();
        assert_eq!(err, StrandError::Config("mode is not specified".into()));

        let err = parse(&["--mode", "list"]).command_request().unwrap_err();
        assert_eq!(err, StrandError::Config("marketid is empty".into()));
    }

    #[test]
    fn unknown_mode() {
        let err = parse(&["--mode", "sweep", "--marketid", "1"]).command_request().unwrap_err();
        assert_eq!(err, StrandError::UnknownMode("sweep".into()));
        assert!(Cli::usage().contains("--mode"));
    }

    #[test]
    fn cancel_requires_an_order_id() {
        let err = parse(&["--mode", "cancel", "--marketid", "1"]).command_request().unwrap_err();
        assert_eq!(err, StrandError::Config("orderid is empty".into()));

        let err = parse(&["--mode", "cancel", "--marketid", "1", "--orderid", "  "])
            .command_request()
            .unwrap_err();
        assert!(err.is_config());

        let req = parse(&["--mode", "cancel", "--marketid", "1", "--orderid", "X1"])
            .command_request()
            .unwrap();
        assert_eq!(req, CommandRequest::cancel(MarketId(1), "X1"));
    }

    #[test]
    fn place_parameters() {
        let cli = parse(&[
            "--mode", "place", "--marketid", "4", "--side", "sell", "--price", "100.5", "--amount", "0.01",
        ]);
        match cli.command_request().unwrap().command {
            Command::Place(p) => {
                assert_eq!(p.market_id, MarketId(4));
                assert_eq!(p.side, OrderSide::Sell);
                assert_eq!(p.order_type, OrderType::Limit);
                assert_eq!(p.price, Some(dec!(100.5)));
                assert_eq!(p.amount, dec!(0.01));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn place_validation() {
        let err = parse(&["--mode", "place", "--marketid", "4", "--amount", "1"])
            .command_request()
            .unwrap_err();
        assert_eq!(err, StrandError::Config("price is required for limit orders".into()));

        let err = parse(&["--mode", "place", "--marketid", "4", "--price", "1", "--amount", "0"])
            .command_request()
            .unwrap_err();
        assert!(err.is_config());

        let cli = parse(&[
            "--mode", "place", "--marketid", "4", "--ordertype", "market", "--price", "9", "--amount", "2",
        ]);
        match cli.command_request().unwrap().command {
            Command::Place(p) => assert_eq!(p.price, None),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn exchange_credentials_come_in_pairs() {
        let cli = parse(&["--mode", "list", "--marketid", "1", "--exchangekey", "k"]);
        assert!(cli.command_request().unwrap_err().is_config());

        let cli = parse(&[
            "--mode", "list", "--marketid", "1", "--exchangekey", "k", "--exchangesecret", "s",
        ]);
        let markets = cli.market_params().unwrap();
        assert_eq!(markets.len(), 1);
        assert_eq!(markets[0].market_id, MarketId(1));
        assert_eq!(
            markets[0].exchange_auth,
            Some(ExchangeAuth { api_key: "k".into(), api_secret: "s".into() })
        );
    }
}
