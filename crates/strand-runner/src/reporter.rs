//! Operator-facing reporting of connection state changes.
//!
//! The reporter owns its own event subscription and never influences the
//! outcome of a run. An error that takes the connection down is held in a
//! [`PendingError`] and printed together with the transition it caused:
//!
//! ```text
//! State updated: authenticating -> disconnected (error): auth rejected
//! ```

use std::sync::Mutex;

use strand_core::ConnState;
use strand_td::{EventSubscription, SessionEvent};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Single-slot holder for the error behind the next transition.
///
/// The first stored error wins until it is taken.
#[derive(Debug, Default)]
pub struct PendingError {
    slot: Mutex<Option<String>>,
}

impl PendingError {
    /// Store `message` unless an error is already pending. Never blocks on
    /// a full slot.
    pub fn stash(&self, message: &str) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return false;
        }
        *slot = Some(message.to_string());
        true
    }

    /// Remove and return the pending error.
    pub fn take(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Renders [`SessionEvent`]s as log lines.
pub struct StateChangeReporter {
    verbose: bool,
    pending: PendingError,
}

impl StateChangeReporter {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            pending: PendingError::default(),
        }
    }

    pub fn pending(&self) -> &PendingError {
        &self.pending
    }

    /// Render a transition, consuming the pending error in verbose mode.
    pub fn render_transition(&self, from: ConnState, to: ConnState) -> String {
        let annotation = if self.verbose { self.pending.take() } else { None };
        match annotation {
            Some(err) => format!("State updated: {from} -> {to}: {err}"),
            None => format!("State updated: {from} -> {to}"),
        }
    }

    /// Log one event. Returns the rendered line for state transitions.
    pub fn handle(&self, event: &SessionEvent) -> Option<String> {
        match event {
            SessionEvent::StateChanged { from, to, .. } => {
                let line = self.render_transition(*from, *to);
                if self.verbose {
                    info!("{line}");
                } else {
                    debug!("{line}");
                }
                return Some(line);
            }
            SessionEvent::Ready => debug!("[reporter] session ready"),
            SessionEvent::Error { market_id, message, disconnecting } => {
                if *disconnecting && self.verbose {
                    if !self.pending.stash(message) {
                        debug!("[reporter] error already pending, dropping: {message}");
                    }
                } else if self.verbose {
                    match market_id {
                        Some(m) => error!("Error on market {m}: {message}"),
                        None => error!("Error: {message}"),
                    }
                }
            }
            SessionEvent::SubscriptionResult { failed } if !failed.is_empty() => {
                warn!("Subscription failed {failed:?}");
            }
            SessionEvent::SubscriptionResult { .. } => debug!("[reporter] all subscriptions accepted"),
        }
        None
    }

    /// Consume `events` until the stream ends, returning every transition line.
    pub async fn run(self, mut events: EventSubscription) -> Vec<String> {
        let mut transitions = Vec::new();
        while let Some(event) = events.recv().await {
            transitions.extend(self.handle(&event));
        }
        debug!("[reporter] event stream closed");
        transitions
    }

    /// [`run`](Self::run) on a background task.
    pub fn spawn(self, events: EventSubscription) -> JoinHandle<Vec<String>> {
        tokio::spawn(self.run(events))
    }
}
