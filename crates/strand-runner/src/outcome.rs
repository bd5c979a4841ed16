//! Single-slot, first-writer-wins handoff of the session outcome.
//!
//! Several producers race to decide how the run ends: the dispatcher, the
//! error watcher, and the shutdown coordinator. The slot keeps the first
//! value offered; every later offer is logged and dropped without blocking.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::command::Report;

/// Exit status for a successful run or an operator cancel.
pub const EXIT_OK: u8 = 0;
/// Exit status for any runtime failure.
pub const EXIT_FAILURE: u8 = 1;
/// Exit status for invalid arguments or configuration.
pub const EXIT_CONFIG: u8 = 2;

/// How a run ended.
#[derive(Debug)]
pub enum Outcome {
    /// The operator interrupted the run.
    OperatorCancelled,
    /// The command ran and produced a report.
    CommandSucceeded(Report),
    /// The command ran and failed.
    CommandFailed(anyhow::Error),
    /// The session reported an error before the command finished.
    MidSessionError(String),
    /// The connection went down before readiness without reporting an error.
    ConnectionClosedUnexpectedly,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::OperatorCancelled | Self::CommandSucceeded(_))
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_success() { EXIT_OK } else { EXIT_FAILURE }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorCancelled => write!(f, "cancelled by operator"),
            Self::CommandSucceeded(report) => write!(f, "{report}"),
            Self::CommandFailed(e) => write!(f, "command failed: {e:#}"),
            Self::MidSessionError(message) => write!(f, "session error: {message}"),
            Self::ConnectionClosedUnexpectedly => write!(f, "connection closed unexpectedly"),
        }
    }
}

/// Create a fresh outcome slot.
pub fn outcome_slot() -> (OutcomeSender, OutcomeReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (
        OutcomeSender {
            tx,
            decided: Arc::new(AtomicBool::new(false)),
        },
        OutcomeReceiver { rx },
    )
}

/// Producer side. Cheap to clone; all clones share one decision.
#[derive(Clone)]
pub struct OutcomeSender {
    tx: mpsc::Sender<Outcome>,
    decided: Arc<AtomicBool>,
}

impl OutcomeSender {
    /// Record `outcome` if nothing was recorded yet. Never blocks.
    ///
    /// Returns whether this call decided the outcome.
    pub fn offer(&self, outcome: Outcome) -> bool {
        if self.decided.swap(true, Ordering::SeqCst) {
            warn!("[outcome] already decided, discarding: {outcome}");
            return false;
        }
        // Only the winner of the flag sends, so the single slot is always free.
        match self.tx.try_send(outcome) {
            Ok(()) => true,
            Err(TrySendError::Full(outcome) | TrySendError::Closed(outcome)) => {
                warn!("[outcome] receiver gone, discarding: {outcome}");
                false
            }
        }
    }

    pub fn is_decided(&self) -> bool {
        self.decided.load(Ordering::SeqCst)
    }
}

/// Consumer side, held by the shutdown coordinator.
pub struct OutcomeReceiver {
    rx: mpsc::Receiver<Outcome>,
}

impl OutcomeReceiver {
    /// Wait for the outcome. `None` if every sender is gone without a value.
    pub async fn recv(&mut self) -> Option<Outcome> {
        self.rx.recv().await
    }

    /// Take the outcome if it has already been recorded.
    pub fn try_take(&mut self) -> Option<Outcome> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_offer_wins() {
        let (tx, mut rx) = outcome_slot();
        let other = tx.clone();

        assert!(tx.offer(Outcome::MidSessionError("boom".into())));
        assert!(!other.offer(Outcome::OperatorCancelled));
        assert!(!tx.offer(Outcome::ConnectionClosedUnexpectedly));
        assert!(other.is_decided());

        match rx.recv().await {
            Some(Outcome::MidSessionError(m)) => assert_eq!(m, "boom"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(rx.try_take().is_none());
    }

    #[test]
    fn late_offers_never_block() {
        let (tx, _rx) = outcome_slot();
        assert!(tx.offer(Outcome::OperatorCancelled));
        for _ in 0..100 {
            assert!(!tx.offer(Outcome::ConnectionClosedUnexpectedly));
        }
    }

    #[test]
    fn exit_codes() {
        assert_eq!(Outcome::OperatorCancelled.exit_code(), EXIT_OK);
        assert_eq!(Outcome::ConnectionClosedUnexpectedly.exit_code(), EXIT_FAILURE);
        assert_eq!(Outcome::MidSessionError("x".into()).exit_code(), EXIT_FAILURE);
        assert_eq!(
            Outcome::CommandFailed(anyhow::anyhow!("rejected")).exit_code(),
            EXIT_FAILURE
        );
    }

    #[test]
    fn failed_command_renders_the_error_chain() {
        let err = anyhow::anyhow!("insufficient funds").context("place order failed");
        let rendered = Outcome::CommandFailed(err).to_string();
        assert_eq!(rendered, "command failed: place order failed: insufficient funds");
    }
}
