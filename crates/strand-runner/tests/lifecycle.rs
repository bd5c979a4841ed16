//! End-to-end lifecycle tests against the scripted session.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use rust_decimal_macros::dec;
use strand_core::MarketId;
use strand_core::trading::Balances;
use strand_core::config::AppConfig;
use strand_runner::app;
use strand_runner::cli::Cli;
use strand_runner::{
    CommandDispatcher, CommandRequest, ConnectionOrchestrator, Outcome, Report, ShutdownCoordinator,
};
use strand_runner::reporter::StateChangeReporter;
use strand_td::TradeSession;
use strand_td::mock::MockSession;
use strand_td::ws::protocol::MarketParams;
use tempfile::NamedTempFile;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn empty_config() -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    write!(f, "{{}}").unwrap();
    f
}

fn cli(config: &NamedTempFile, args: &[&str]) -> Cli {
    let path = config.path().to_str().unwrap();
    let mut argv = vec!["strand-trade", "--config", path];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

fn factory(session: &Arc<MockSession>) -> impl FnOnce(&AppConfig, Vec<MarketParams>) -> Arc<dyn TradeSession> {
    let session = Arc::clone(session);
    move |_, _| session as Arc<dyn TradeSession>
}

async fn run_coordinated(session: &Arc<MockSession>, request: CommandRequest, interrupt_after: Option<Duration>) -> Outcome {
    let orchestrator = ConnectionOrchestrator::new(session.clone(), CommandDispatcher::new(request));
    let coordinator = ShutdownCoordinator::new(session.clone());
    let interrupt = async move {
        match interrupt_after {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending().await,
        }
    };
    tokio::time::timeout(TEST_TIMEOUT, coordinator.run(orchestrator, interrupt))
        .await
        .expect("coordinator did not finish")
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn no_dispatch_before_ready() {
    let session = Arc::new(
        MockSession::new()
            .ready_after(Duration::from_millis(30))
            .with_orders(&["A1"]),
    );
    let outcome = run_coordinated(&session, CommandRequest::list(MarketId(1)), None).await;

    assert!(matches!(outcome, Outcome::CommandSucceeded(_)));
    assert_eq!(session.calls_before_ready(), 0);
    assert_eq!(session.calls(), vec!["get_orders"]);
}

#[tokio::test]
async fn dispatch_runs_at_most_once() {
    let session = Arc::new(MockSession::new());
    let outcome = run_coordinated(&session, CommandRequest::balances(MarketId(1)), None).await;

    assert!(outcome.is_success());
    assert_eq!(session.calls().len(), 1);
    assert_eq!(session.connect_calls(), 1);
}

#[tokio::test]
async fn mid_session_error_beats_a_slow_dispatch() {
    let session = Arc::new(
        MockSession::new()
            .ready_after(Duration::from_millis(1))
            .call_latency(Duration::from_millis(60))
            .error_after(Duration::from_millis(15), "market halted", false),
    );
    let outcome = run_coordinated(&session, CommandRequest::balances(MarketId(1)), None).await;

    match outcome {
        Outcome::MidSessionError(m) => assert_eq!(m, "market halted"),
        other => panic!("unexpected outcome {other:?}"),
    }
    // The dispatch still completed; its result was only logged.
    assert_eq!(session.calls(), vec!["get_balances"]);
    assert_eq!(session.close_calls(), 1);
}

#[tokio::test]
async fn dispatch_result_beats_a_later_error() {
    let session = Arc::new(
        MockSession::new()
            .ready_after(Duration::from_millis(1))
            .error_after(Duration::from_millis(80), "late failure", true),
    );
    let outcome = run_coordinated(&session, CommandRequest::balances(MarketId(1)), None).await;
    assert!(matches!(outcome, Outcome::CommandSucceeded(_)));
}

#[tokio::test]
async fn interrupt_before_ready_closes_without_dispatch() {
    let session = Arc::new(MockSession::new().never_ready());
    let outcome = run_coordinated(
        &session,
        CommandRequest::list(MarketId(1)),
        Some(Duration::from_millis(10)),
    )
    .await;

    assert!(matches!(outcome, Outcome::OperatorCancelled));
    assert_eq!(outcome.exit_code(), 0);
    assert!(session.calls().is_empty());
    assert_eq!(session.close_calls(), 1);
}

#[tokio::test]
async fn close_after_failed_connect_is_safe_and_repeatable() {
    let session = Arc::new(MockSession::new().fail_connect("connection refused"));
    let outcome = run_coordinated(&session, CommandRequest::list(MarketId(1)), None).await;

    match &outcome {
        Outcome::MidSessionError(m) => assert!(m.contains("connection refused"), "{m}"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(session.close_calls(), 1);

    session.close().await.unwrap();
    assert_eq!(session.close_calls(), 2);
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test]
async fn silent_disconnect_before_ready_fails_the_run() {
    let session = Arc::new(MockSession::new().never_ready().drop_after(Duration::from_millis(5)));
    let outcome = run_coordinated(&session, CommandRequest::list(MarketId(1)), None).await;

    assert!(matches!(outcome, Outcome::ConnectionClosedUnexpectedly));
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(session.close_calls(), 1);
}

// ---------------------------------------------------------------------------
// Full runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_reports_every_order() {
    let session = Arc::new(MockSession::new().with_orders(&["A1", "A2"]));
    let outcome = run_coordinated(&session, CommandRequest::list(MarketId(3)), None).await;
    let report = outcome.to_string();
    assert!(report.contains("A1") && report.contains("A2"), "{report}");

    let config = empty_config();
    let session = Arc::new(MockSession::new().with_orders(&["A1", "A2"]));
    let code = app::run(
        &cli(&config, &["--mode", "list", "--marketid", "3"]),
        factory(&session),
        std::future::pending(),
    )
    .await;
    assert_eq!(code, 0);
    assert_eq!(session.close_calls(), 1);
}

#[tokio::test]
async fn cancel_without_order_id_never_connects() {
    let config = empty_config();
    let session = Arc::new(MockSession::new());
    let built = Arc::new(AtomicBool::new(false));
    let built_flag = Arc::clone(&built);
    let handle = Arc::clone(&session);

    let code = app::run(
        &cli(&config, &["--mode", "cancel", "--marketid", "3"]),
        move |_, _| {
            built_flag.store(true, Ordering::SeqCst);
            handle as Arc<dyn TradeSession>
        },
        std::future::pending(),
    )
    .await;

    assert_eq!(code, 2);
    assert!(!built.load(Ordering::SeqCst));
    assert_eq!(session.connect_calls(), 0);
}

#[tokio::test]
async fn unknown_mode_is_a_config_error() {
    let config = empty_config();
    let session = Arc::new(MockSession::new());
    let code = app::run(
        &cli(&config, &["--mode", "withdraw", "--marketid", "3"]),
        factory(&session),
        std::future::pending(),
    )
    .await;
    assert_eq!(code, 2);
    assert_eq!(session.connect_calls(), 0);
}

#[tokio::test]
async fn rejected_order_fails_and_closes_once() {
    let config = empty_config();
    let session = Arc::new(MockSession::new().reject_place("insufficient funds"));
    let code = app::run(
        &cli(
            &config,
            &["--mode", "place", "--marketid", "3", "--price", "0.01", "--amount", "0.01"],
        ),
        factory(&session),
        std::future::pending(),
    )
    .await;

    assert_ne!(code, 0);
    assert_eq!(session.calls(), vec!["place_order"]);
    assert_eq!(session.close_calls(), 1);
}

#[tokio::test]
async fn early_interrupt_is_a_clean_exit() {
    let config = empty_config();
    let session = Arc::new(MockSession::new().never_ready());
    let code = app::run(
        &cli(&config, &["--mode", "balances", "--marketid", "3"]),
        factory(&session),
        tokio::time::sleep(Duration::from_millis(10)),
    )
    .await;

    assert_eq!(code, 0);
    assert!(session.calls().is_empty());
    assert_eq!(session.close_calls(), 1);
}

#[tokio::test]
async fn balances_report_every_currency() {
    let mut balances = Balances::new();
    balances.insert("BTC".into(), dec!(0.5));
    balances.insert("USD".into(), dec!(1200));

    let session = Arc::new(MockSession::new().with_balances(balances.clone()));
    let outcome = run_coordinated(&session, CommandRequest::balances(MarketId(3)), None).await;
    match &outcome {
        Outcome::CommandSucceeded(Report::Balances(reported)) => assert_eq!(reported, &balances),
        other => panic!("unexpected outcome {other:?}"),
    }
    let report = outcome.to_string();
    assert!(report.contains("BTC: 0.5") && report.contains("USD: 1200"), "{report}");

    let config = empty_config();
    let session = Arc::new(MockSession::new().with_balances(balances));
    let code = app::run(
        &cli(&config, &["--mode", "balances", "--marketid", "3"]),
        factory(&session),
        std::future::pending(),
    )
    .await;
    assert_eq!(code, 0);
    assert_eq!(session.calls(), vec!["get_balances"]);
}

#[tokio::test]
async fn verbose_run_annotates_the_failing_transition_once() {
    let session = Arc::new(
        MockSession::new()
            .never_ready()
            .error_after(Duration::from_millis(5), "auth rejected", true),
    );
    let reporter = StateChangeReporter::new(true).spawn(session.subscribe());

    let outcome = run_coordinated(&session, CommandRequest::list(MarketId(1)), None).await;
    assert!(matches!(outcome, Outcome::MidSessionError(_)));

    let transitions = tokio::time::timeout(TEST_TIMEOUT, reporter).await.unwrap().unwrap();
    let annotated: Vec<&String> = transitions.iter().filter(|l| l.contains("auth rejected")).collect();
    assert_eq!(
        annotated,
        vec!["State updated: authenticating -> disconnected (error): auth rejected"],
        "{transitions:#?}"
    );
    assert_eq!(
        transitions.last().map(String::as_str),
        Some("State updated: disconnected (error) -> disconnected")
    );
    assert!(session.calls().is_empty());
}

#[tokio::test]
async fn verbose_flag_reaches_a_full_run() {
    let config = empty_config();
    let session = Arc::new(
        MockSession::new()
            .never_ready()
            .error_after(Duration::from_millis(5), "auth rejected", true),
    );
    let code = app::run(
        &cli(&config, &["--mode", "list", "--marketid", "1", "--verbose"]),
        factory(&session),
        std::future::pending(),
    )
    .await;

    assert_eq!(code, 1);
    assert!(session.calls().is_empty());
    assert_eq!(session.close_calls(), 1);
}
