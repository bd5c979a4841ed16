//! # strand-trade
//!
//! One-shot trading client: connects an authenticated session, waits until
//! it is ready, runs exactly one command and exits.
//!
//! # Usage
//!
//! ```bash
//! strand-trade --mode list --marketid 12
//! strand-trade --mode place --marketid 12 --side sell --price 101.5 --amount 0.25
//! strand-trade --mode cancel --marketid 12 --orderid X91 -v
//! ```
//!
//! Exit status: 0 on success or Ctrl+C, 1 on a runtime failure, 2 on bad
//! arguments or configuration.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use strand_core::logging::{effective_level, init_logging};
use strand_runner::app;
use strand_runner::cli::Cli;
use strand_runner::shutdown::wait_for_interrupt;
use strand_td::TradeSession;
use strand_td::ws::WsTradeSession;
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 1. Initialize logging
    init_logging(effective_level(&cli.log_level, cli.verbose), cli.log_dir.as_deref(), "strand-trade");
    info!("strand-trade starting, mode={} marketid={}", cli.mode, cli.marketid);

    // 2. Validate, connect, dispatch, close
    let code = app::run(
        &cli,
        |config, markets| Arc::new(WsTradeSession::new(config, markets)) as Arc<dyn TradeSession>,
        wait_for_interrupt(),
    )
    .await;

    info!("strand-trade finished, exit status {code}");
    ExitCode::from(code)
}
