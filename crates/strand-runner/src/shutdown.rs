//! Interrupt handling and the single close of the session.
//!
//! ```text
//!   Running ──(outcome │ interrupt │ orchestrator gone)──► Finalizing ──(close)──► Terminated
//! ```
//!
//! The coordinator spawns the orchestrator, races its outcome against the
//! operator interrupt, cancels whatever is still waiting, and closes the
//! connection exactly once.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use strand_td::TradeSession;
use tokio::sync::watch;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

use crate::orchestrator::ConnectionOrchestrator;
use crate::outcome::{Outcome, outcome_slot};

/// Coordinator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownPhase {
    /// Waiting for an outcome or an interrupt.
    Running,
    /// Outcome decided; settling the orchestrator and closing.
    Finalizing,
    /// Connection closed.
    Terminated,
}

impl fmt::Display for ShutdownPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownPhase::Running => write!(f, "running"),
            ShutdownPhase::Finalizing => write!(f, "finalizing"),
            ShutdownPhase::Terminated => write!(f, "terminated"),
        }
    }
}

/// What ended the `Running` phase.
enum Trigger {
    Outcome(Outcome),
    Interrupt,
    OrchestratorGone(Result<(), JoinError>),
}

pub struct ShutdownCoordinator {
    session: Arc<dyn TradeSession>,
    phase: watch::Sender<ShutdownPhase>,
}

impl ShutdownCoordinator {
    pub fn new(session: Arc<dyn TradeSession>) -> Self {
        let (phase, _) = watch::channel(ShutdownPhase::Running);
        Self { session, phase }
    }

    /// Observe phase changes.
    pub fn phase_receiver(&self) -> watch::Receiver<ShutdownPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> ShutdownPhase {
        *self.phase.borrow()
    }

    /// Drive `orchestrator` until it decides an outcome or `interrupt`
    /// resolves, then close the session and return the outcome.
    pub async fn run<I>(self, orchestrator: ConnectionOrchestrator, interrupt: I) -> Outcome
    where
        I: Future<Output = ()>,
    {
        let (outcome_tx, mut outcome_rx) = outcome_slot();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let mut task = tokio::spawn(orchestrator.run(outcome_tx.clone(), cancel_rx));
        tokio::pin!(interrupt);

        let trigger = tokio::select! {
            biased;
            Some(outcome) = outcome_rx.recv() => Trigger::Outcome(outcome),
            _ = &mut interrupt => Trigger::Interrupt,
            res = &mut task => Trigger::OrchestratorGone(res),
        };

        self.set_phase(ShutdownPhase::Finalizing);
        let _ = cancel_tx.send(true);

        let outcome = match trigger {
            Trigger::Outcome(outcome) => {
                settle(task).await;
                outcome
            }
            Trigger::Interrupt => {
                info!("[shutdown] interrupt received");
                outcome_tx.offer(Outcome::OperatorCancelled);
                settle(task).await;
                outcome_rx.try_take().unwrap_or(Outcome::OperatorCancelled)
            }
            Trigger::OrchestratorGone(res) => {
                if let Err(e) = res {
                    error!("[shutdown] orchestrator task failed: {e}");
                    outcome_tx.offer(Outcome::MidSessionError(format!("orchestrator task failed: {e}")));
                }
                outcome_rx.try_take().unwrap_or(Outcome::ConnectionClosedUnexpectedly)
            }
        };
        info!("[shutdown] outcome: {outcome}");

        if let Err(e) = self.session.close().await {
            error!("[shutdown] failed to close connection: {e:#}");
        }
        self.set_phase(ShutdownPhase::Terminated);
        outcome
    }

    fn set_phase(&self, phase: ShutdownPhase) {
        debug!("[shutdown] phase: {phase}");
        self.phase.send_replace(phase);
    }
}

async fn settle(task: tokio::task::JoinHandle<()>) {
    if let Err(e) = task.await {
        warn!("[shutdown] orchestrator task ended abnormally: {e}");
    }
}

/// Resolve on SIGINT, SIGTERM or SIGQUIT (Ctrl+C elsewhere).
pub async fn wait_for_interrupt() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match (signal(SignalKind::terminate()), signal(SignalKind::quit())) {
            (Ok(mut term), Ok(mut quit)) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(e) = res {
                            error!("failed to listen for ctrl-c: {e}");
                            std::future::pending::<()>().await;
                        }
                    }
                    _ = term.recv() => {}
                    _ = quit.recv() => {}
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => warn!("failed to install signal handlers, ctrl-c only: {e}"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use strand_core::MarketId;
    use strand_td::mock::MockSession;

    use crate::command::{CommandDispatcher, CommandRequest};

    fn orchestrator(session: &Arc<MockSession>, request: CommandRequest) -> ConnectionOrchestrator {
        ConnectionOrchestrator::new(session.clone(), CommandDispatcher::new(request))
    }

    #[tokio::test]
    async fn success_closes_once_and_terminates() {
        let session = Arc::new(MockSession::new().with_orders(&["A1"]));
        let coordinator = ShutdownCoordinator::new(session.clone());
        let phases = coordinator.phase_receiver();

        let outcome = coordinator
            .run(orchestrator(&session, CommandRequest::list(MarketId(1))), std::future::pending())
            .await;

        assert!(matches!(outcome, Outcome::CommandSucceeded(_)));
        assert_eq!(session.close_calls(), 1);
        assert_eq!(*phases.borrow(), ShutdownPhase::Terminated);
    }

    #[tokio::test]
    async fn interrupt_lets_an_inflight_dispatch_finish() {
        let session = Arc::new(
            MockSession::new()
                .ready_after(Duration::from_millis(1))
                .call_latency(Duration::from_millis(50)),
        );
        let coordinator = ShutdownCoordinator::new(session.clone());
        let interrupt = tokio::time::sleep(Duration::from_millis(20));

        let outcome = coordinator
            .run(orchestrator(&session, CommandRequest::balances(MarketId(1))), interrupt)
            .await;

        // The cancel offer came first; the finished dispatch is only logged.
        assert!(matches!(outcome, Outcome::OperatorCancelled));
        assert_eq!(session.calls(), vec!["get_balances"]);
        assert_eq!(session.close_calls(), 1);
    }

    #[tokio::test]
    async fn close_failure_keeps_the_outcome() {
        let session = Arc::new(MockSession::new().fail_close("socket already gone"));
        let coordinator = ShutdownCoordinator::new(session.clone());

        let outcome = coordinator
            .run(orchestrator(&session, CommandRequest::balances(MarketId(1))), std::future::pending())
            .await;

        assert!(matches!(outcome, Outcome::CommandSucceeded(_)));
        assert_eq!(session.close_calls(), 1);
    }
}
