//! Drives one session from connect to a single dispatched command.
//!
//! ```text
//!   subscribe ─► connect ─► select! { biased; cancel │ Ready } ─► dispatch ─► offer
//!        │
//!        └─► error watcher: Error → MidSessionError
//!                           down before Ready / stream end → ConnectionClosedUnexpectedly
//! ```
//!
//! Every path ends in an offer to the outcome slot; only the first offer
//! counts. The orchestrator never closes the session.

use std::sync::Arc;

use strand_core::ConnState;
use strand_td::{EventSubscription, SessionEvent, TradeSession};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::command::CommandDispatcher;
use crate::outcome::{Outcome, OutcomeSender};

pub struct ConnectionOrchestrator {
    session: Arc<dyn TradeSession>,
    dispatcher: Arc<CommandDispatcher>,
}

impl ConnectionOrchestrator {
    pub fn new(session: Arc<dyn TradeSession>, dispatcher: CommandDispatcher) -> Self {
        Self {
            session,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Shared handle to the dispatcher, for inspection after the run.
    pub fn dispatcher(&self) -> Arc<CommandDispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Connect, wait for readiness and dispatch, offering the result.
    ///
    /// Returns after offering, or once `cancel` flips to `true` while still
    /// waiting for readiness. A run that is already cancelled never connects,
    /// and a run decided before `Ready` never dispatches. An in-flight
    /// dispatch is not interrupted.
    pub async fn run(self, outcome: OutcomeSender, mut cancel: watch::Receiver<bool>) {
        // Both subscriptions exist before connect(), so no event is missed.
        let mut events = self.session.subscribe();
        let watcher = tokio::spawn(watch_session(self.session.subscribe(), outcome.clone()));

        if *cancel.borrow() {
            info!("[orchestrator] cancelled before connecting");
            if !outcome.is_decided() {
                outcome.offer(Outcome::OperatorCancelled);
            }
            watcher.abort();
            return;
        }

        info!("[orchestrator] connecting for: {}", self.dispatcher.request());
        if let Err(e) = self.session.connect().await {
            error!("[orchestrator] connect failed: {e:#}");
            outcome.offer(Outcome::MidSessionError(format!("connect failed: {e:#}")));
            watcher.abort();
            return;
        }

        let readiness = wait_for_ready(&mut events, &mut cancel).await;
        events.cancel();

        match readiness {
            Readiness::Ready if *cancel.borrow() || outcome.is_decided() => {
                info!("[orchestrator] session ready after the run was decided, not dispatching");
            }
            Readiness::Ready => {
                let result = self.dispatcher.dispatch(self.session.as_ref()).await;
                let decided = match result {
                    Ok(report) => outcome.offer(Outcome::CommandSucceeded(report)),
                    Err(e) => outcome.offer(Outcome::CommandFailed(e)),
                };
                debug!("[orchestrator] dispatch finished, decided outcome: {decided}");
            }
            Readiness::Cancelled => {
                if !outcome.is_decided() {
                    info!("[orchestrator] cancelled before the session became ready");
                    outcome.offer(Outcome::OperatorCancelled);
                }
            }
            Readiness::StreamEnded => {
                if !outcome.is_decided() {
                    warn!("[orchestrator] event stream ended before the session became ready");
                    outcome.offer(Outcome::ConnectionClosedUnexpectedly);
                }
            }
        }
        watcher.abort();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Ready,
    Cancelled,
    StreamEnded,
}

/// Wait for `Ready` or cancellation. Cancellation wins when both are pending.
async fn wait_for_ready(events: &mut EventSubscription, cancel: &mut watch::Receiver<bool>) -> Readiness {
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Readiness::Cancelled,
        ready = wait_ready(events) => {
            if ready { Readiness::Ready } else { Readiness::StreamEnded }
        }
    }
}

/// Resolve once `rx` carries `true`. A dropped sender never resolves.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// `true` on `Ready`, `false` if the stream ends first.
async fn wait_ready(events: &mut EventSubscription) -> bool {
    while let Some(event) = events.recv().await {
        if event == SessionEvent::Ready {
            return true;
        }
    }
    false
}

/// Turns session failures into outcomes.
async fn watch_session(mut events: EventSubscription, outcome: OutcomeSender) {
    let mut ready = false;
    let mut errored = false;
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Ready => ready = true,
            SessionEvent::Error { market_id, message, .. } => {
                errored = true;
                let message = match market_id {
                    Some(m) => format!("market {m}: {message}"),
                    None => message,
                };
                outcome.offer(Outcome::MidSessionError(message));
            }
            SessionEvent::StateChanged { to: ConnState::Disconnected | ConnState::Failed, .. }
                if !ready && !errored =>
            {
                outcome.offer(Outcome::ConnectionClosedUnexpectedly);
            }
            _ => {}
        }
    }
    if !outcome.is_decided() {
        outcome.offer(Outcome::ConnectionClosedUnexpectedly);
    }
}
