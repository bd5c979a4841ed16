//! One `strand-trade` run, from parsed arguments to exit status.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use strand_core::config::{self, AppConfig};
use strand_core::error::StrandError;
use strand_td::TradeSession;
use strand_td::ws::protocol::MarketParams;
use tracing::{debug, error, info};

use crate::cli::Cli;
use crate::command::{CommandDispatcher, CommandRequest};
use crate::orchestrator::ConnectionOrchestrator;
use crate::outcome::{EXIT_CONFIG, Outcome};
use crate::reporter::StateChangeReporter;
use crate::shutdown::ShutdownCoordinator;

/// How long the reporter may keep draining events after close.
const REPORTER_GRACE: Duration = Duration::from_secs(1);

/// Everything a run needs, validated before any connection exists.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub request: CommandRequest,
    pub config: AppConfig,
    pub markets: Vec<MarketParams>,
    pub verbose: bool,
}

/// Validate arguments and load the config file.
pub fn prepare(cli: &Cli) -> Result<Prepared, StrandError> {
    let request = cli.command_request()?;
    let markets = cli.market_params()?;
    let config = config::load_or_default(cli.config.as_deref())
        .map_err(|e| StrandError::Config(format!("{e:#}")))?;
    Ok(Prepared {
        request,
        config,
        markets,
        verbose: cli.verbose,
    })
}

/// Run the prepared command on `session` and return the final outcome.
pub async fn execute<I>(prepared: Prepared, session: Arc<dyn TradeSession>, interrupt: I) -> Outcome
where
    I: Future<Output = ()>,
{
    info!("[app] {} (verbose={})", prepared.request, prepared.verbose);
    let mut reporter = StateChangeReporter::new(prepared.verbose).spawn(session.subscribe());

    let orchestrator = ConnectionOrchestrator::new(Arc::clone(&session), CommandDispatcher::new(prepared.request));
    let outcome = ShutdownCoordinator::new(session).run(orchestrator, interrupt).await;

    // close() ends the event stream, so the reporter drains and exits.
    match tokio::time::timeout(REPORTER_GRACE, &mut reporter).await {
        Ok(Ok(lines)) => debug!("[app] reporter rendered {} transition(s)", lines.len()),
        Ok(Err(e)) => error!("[app] reporter task failed: {e}"),
        Err(_) => {
            debug!("[app] reporter still running after close, aborting");
            reporter.abort();
        }
    }
    outcome
}

/// Full run: validate, build the session with `make_session`, execute and
/// print the result. Returns the process exit status.
pub async fn run<F, I>(cli: &Cli, make_session: F, interrupt: I) -> u8
where
    F: FnOnce(&AppConfig, Vec<MarketParams>) -> Arc<dyn TradeSession>,
    I: Future<Output = ()>,
{
    let prepared = match prepare(cli) {
        Ok(p) => p,
        Err(e) => return report_config_error(&e),
    };
    let session = make_session(&prepared.config, prepared.markets.clone());
    let outcome = execute(prepared, session, interrupt).await;
    print_outcome(&outcome);
    outcome.exit_code()
}

/// Print a configuration error (and usage for an unknown mode).
pub fn report_config_error(err: &StrandError) -> u8 {
    eprintln!("{err}");
    if matches!(err, StrandError::UnknownMode(_)) {
        eprintln!("{}", Cli::usage());
    }
    EXIT_CONFIG
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::CommandSucceeded(report) => println!("{report}"),
        Outcome::OperatorCancelled => info!("cancelled by operator"),
        failure => eprintln!("Error: {failure}"),
    }
}
