//! Autoplay-policy recovery.
//!
//! When the playback device refuses to start audio without a user gesture,
//! the resource is parked and retried once on the next gesture. This
//! module holds the two pieces the manager drives: the [`GestureGate`]
//! (the host signals pointer/key/touch activation into it) and the
//! explicit [`RecoveryPhase`] state machine:
//!
//! ```text
//!   Blocked → WaitingForGesture → Retried
//!                     │
//!                     └──(30 s, no gesture)──→ Expired
//! ```

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

/// How long a blocked resource waits for a user gesture before expiring.
pub const GESTURE_TIMEOUT: Duration = Duration::from_secs(30);

/// Phase of one recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryPhase {
    /// Playback was just rejected by autoplay policy.
    Blocked,

    /// One-shot listeners armed; waiting for the next user gesture.
    WaitingForGesture,

    /// A gesture arrived and the single retry was issued.
    Retried,

    /// No gesture within the window; the resource is released.
    Expired,
}

/// Outcome of waiting on the gesture gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureWait {
    /// A user gesture arrived inside the window.
    Gesture,

    /// The window elapsed without a gesture.
    TimedOut,

    /// A global stop tore the wait down.
    Cancelled,
}

/// Shared gate the host signals user gestures into.
///
/// Cheap to clone; all clones share the same notifier.
#[derive(Clone, Default)]
pub struct GestureGate {
    notify: Arc<Notify>,
}

impl GestureGate {
    /// New gate with no waiters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal that a user gesture (pointer, key, or touch activation)
    /// occurred. Wakes every currently waiting recovery.
    pub fn signal(&self) {
        self.notify.notify_waiters();
    }

    /// Wait for the next gesture, a timeout, or cancellation — whichever
    /// comes first.
    pub async fn wait(&self, timeout: Duration, cancel: &CancellationToken) -> GestureWait {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Arm before racing so a gesture between now and the select is not
        // lost.
        notified.as_mut().enable();

        tokio::select! {
            () = notified => GestureWait::Gesture,
            () = sleep(timeout) => GestureWait::TimedOut,
            () = cancel.cancelled() => GestureWait::Cancelled,
        }
    }
}

/// Explicit state machine for one blocked resource.
#[derive(Debug)]
pub struct Recovery {
    phase: RecoveryPhase,
}

impl Default for Recovery {
    fn default() -> Self {
        Self::new()
    }
}

impl Recovery {
    /// A recovery in the `Blocked` phase.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: RecoveryPhase::Blocked,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> RecoveryPhase {
        self.phase
    }

    /// Arm the gesture listeners: `Blocked → WaitingForGesture`.
    pub fn arm(&mut self) {
        debug_assert_eq!(self.phase, RecoveryPhase::Blocked);
        self.phase = RecoveryPhase::WaitingForGesture;
    }

    /// A gesture arrived: `WaitingForGesture → Retried`.
    pub fn gesture(&mut self) {
        debug_assert_eq!(self.phase, RecoveryPhase::WaitingForGesture);
        self.phase = RecoveryPhase::Retried;
    }

    /// The window elapsed: `WaitingForGesture → Expired`.
    pub fn expire(&mut self) {
        debug_assert_eq!(self.phase, RecoveryPhase::WaitingForGesture);
        self.phase = RecoveryPhase::Expired;
    }

    /// Whether this recovery reached a terminal phase.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self.phase, RecoveryPhase::Retried | RecoveryPhase::Expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_in_order() {
        let mut recovery = Recovery::new();
        assert_eq!(recovery.phase(), RecoveryPhase::Blocked);
        assert!(!recovery.is_terminal());

        recovery.arm();
        assert_eq!(recovery.phase(), RecoveryPhase::WaitingForGesture);

        recovery.gesture();
        assert_eq!(recovery.phase(), RecoveryPhase::Retried);
        assert!(recovery.is_terminal());
    }

    #[test]
    fn expiry_is_terminal() {
        let mut recovery = Recovery::new();
        recovery.arm();
        recovery.expire();
        assert_eq!(recovery.phase(), RecoveryPhase::Expired);
        assert!(recovery.is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_resolves_on_gesture() {
        let gate = GestureGate::new();
        let cancel = CancellationToken::new();

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.wait(GESTURE_TIMEOUT, &cancel).await })
        };

        tokio::task::yield_now().await;
        gate.signal();
        assert_eq!(waiter.await.unwrap(), GestureWait::Gesture);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_without_gesture() {
        let gate = GestureGate::new();
        let cancel = CancellationToken::new();
        let outcome = gate.wait(Duration::from_secs(30), &cancel).await;
        assert_eq!(outcome, GestureWait::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_observes_cancellation() {
        let gate = GestureGate::new();
        let cancel = CancellationToken::new();

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.wait(GESTURE_TIMEOUT, &cancel).await })
        };

        tokio::task::yield_now().await;
        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), GestureWait::Cancelled);
    }
}
