//! Connection state tracking.
//!
//! [`ConnStateTracker`] holds the current [`ConnState`] and reports every
//! change as an `(old, new, cause)` triple to a listener.

use std::sync::{Arc, Mutex};

use crate::types::ConnState;

/// Listener invoked on every state transition.
///
/// Parameters: `(old_state, new_state, cause)`. Runs while the tracker's lock
/// is held, so it must return quickly and must not call back into the tracker.
pub type OnStateCallback = Arc<dyn Fn(ConnState, ConnState, Option<&str>) + Send + Sync>;

/// Current connection state plus its change listener.
pub struct ConnStateTracker {
    state: Mutex<ConnState>,
    listener: OnStateCallback,
}

impl ConnStateTracker {
    /// Start in [`ConnState::Disconnected`].
    pub fn new(listener: OnStateCallback) -> Self {
        Self {
            state: Mutex::new(ConnState::Disconnected),
            listener,
        }
    }

    pub fn current(&self) -> ConnState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next`, notifying the listener.
    ///
    /// Returns `false` (and notifies nobody) if already in `next`.
    pub fn transition(&self, next: ConnState, cause: Option<&str>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let old = *state;
        if old == next {
            return false;
        }
        *state = next;
        (self.listener)(old, next, cause);
        true
    }

    /// Move to `next` only if the current state is one of `from`.
    pub fn transition_from(&self, from: &[ConnState], next: ConnState, cause: Option<&str>) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let old = *state;
        if old == next || !from.contains(&old) {
            return false;
        }
        *state = next;
        (self.listener)(old, next, cause);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> (ConnStateTracker, Arc<Mutex<Vec<(ConnState, ConnState, Option<String>)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let tracker = ConnStateTracker::new(Arc::new(move |old, new, cause| {
            sink.lock().unwrap().push((old, new, cause.map(str::to_string)));
        }));
        (tracker, seen)
    }

    #[test]
    fn reports_each_change_once() {
        let (tracker, seen) = recording();
        assert!(tracker.transition(ConnState::Connecting, None));
        assert!(!tracker.transition(ConnState::Connecting, None));
        assert!(tracker.transition(ConnState::Failed, Some("read error")));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (ConnState::Disconnected, ConnState::Connecting, None));
        assert_eq!(seen[1], (ConnState::Connecting, ConnState::Failed, Some("read error".to_string())));
        assert_eq!(tracker.current(), ConnState::Failed);
    }

    #[test]
    fn guarded_transition_respects_source_states() {
        let (tracker, seen) = recording();
        assert!(!tracker.transition_from(&[ConnState::Authenticating], ConnState::Ready, None));
        tracker.transition(ConnState::Authenticating, None);
        assert!(tracker.transition_from(&[ConnState::Authenticating], ConnState::Ready, None));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }
}
