//! Shared interrupt signalling.
//!
//! Two cancellation primitives with different blast radii:
//!
//! - [`InterruptController`] is the turn-level flag. One controller is
//!   shared by the whole application; every blocking loop polls it and
//!   every async wait can race against [`InterruptController::notified`].
//!   It is cleared exactly once at the top of each conversation turn.
//! - [`CancelToken`] is a lightweight, cloneable token for cancelling a
//!   single in-flight operation (a speculative transcription, a playback
//!   pipeline) without touching the global flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

/// Why the current turn was interrupted. Reasons are informational;
/// every reason triggers the same stop-and-drain behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    /// The user started speaking while the assistant was talking.
    BargeIn,
    /// An explicit stop request (e.g. Ctrl-C or a control command).
    UserStop,
    /// The application is shutting down.
    Shutdown,
}

impl std::fmt::Display for InterruptReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            InterruptReason::BargeIn => "barge-in",
            InterruptReason::UserStop => "user stop",
            InterruptReason::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Turn-level interrupt flag shared across the capture, pipeline, and
/// playback stations.
#[derive(Clone)]
pub struct InterruptController {
    inner: Arc<Inner>,
}

struct Inner {
    interrupted: AtomicBool,
    shutdown: AtomicBool,
    notify: Notify,
}

impl InterruptController {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                interrupted: AtomicBool::new(false),
                shutdown: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Raises the interrupt flag and wakes all pending waiters.
    pub fn trigger(&self, reason: InterruptReason) {
        if reason == InterruptReason::Shutdown {
            self.inner.shutdown.store(true, Ordering::SeqCst);
        }
        self.inner.interrupted.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// True if the flag is currently raised.
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// True once a shutdown interrupt has been raised. Unlike the
    /// per-turn flag, this is never cleared.
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Clears the per-turn flag. Called exactly once at the start of
    /// each conversation turn.
    pub fn clear(&self) {
        self.inner.interrupted.store(false, Ordering::SeqCst);
    }

    /// Resolves when the flag is raised. Checks the flag before
    /// registering so a trigger that already happened is not missed.
    pub async fn notified(&self) {
        loop {
            if self.is_interrupted() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_interrupted() {
                return;
            }
            notified.await;
        }
    }

    /// Sleeps for `duration`, returning early with `true` if the flag
    /// is raised before it elapses. Replaces blind sleeps everywhere a
    /// delay must stay responsive to interruption.
    pub async fn sleep_interruptible(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_interrupted(),
            _ = self.notified() => true,
        }
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable cancellation token for a single in-flight operation.
#[derive(Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
