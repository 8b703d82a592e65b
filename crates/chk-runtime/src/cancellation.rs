//! Cooperative cancellation (spec.md §4.6).
//!
//! A [`CancellationToken`] is a monotonic flag shared between the thread
//! driving a task and whatever UI action ("Cancel" button / Ctrl-C)
//! raises it. Checking it is always voluntary — a task must call
//! [`CancellationToken::raise_if_cancelled`] or block in
//! [`sleep_attentively`] to notice.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Raised by [`CancellationToken::raise_if_cancelled`] once a token has
/// been cancelled. Kept distinct from ordinary task failures: a task's
/// `run` loop must let this propagate rather than route it through the
/// normal "log the problem and wait for the user" path (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("task was cancelled")]
pub struct Cancelled;

/// A thread-safe, clonable cancellation flag. Once cancelled, stays
/// cancelled — there is no un-cancel.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns `Err(Cancelled)` if this token has been cancelled.
    pub fn raise_if_cancelled(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() { Err(Cancelled) } else { Ok(()) }
    }
}

/// Sleep for `timeout`, waking every `poll_frequency` to check
/// `token`. Returns early with `Err(Cancelled)` the first time the
/// check notices cancellation.
pub fn sleep_attentively(
    timeout: Duration,
    token: &CancellationToken,
    poll_frequency: Duration,
) -> Result<(), Cancelled> {
    if poll_frequency >= timeout {
        std::thread::sleep(timeout);
        return token.raise_if_cancelled();
    }

    let start = Instant::now();
    loop {
        token.raise_if_cancelled()?;
        std::thread::sleep(poll_frequency);
        if start.elapsed() >= timeout {
            return token.raise_if_cancelled();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.raise_if_cancelled().is_ok());
    }

    #[test]
    fn cancel_is_sticky() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.raise_if_cancelled().is_err());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn clone_shares_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn sleep_attentively_short_circuits_on_cancel() {
        let token = CancellationToken::new();
        let t = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            t.cancel();
        });
        let result = sleep_attentively(
            Duration::from_secs(5),
            &token,
            Duration::from_millis(10),
        );
        handle.join().unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn sleep_attentively_completes_without_cancel() {
        let token = CancellationToken::new();
        let result = sleep_attentively(
            Duration::from_millis(30),
            &token,
            Duration::from_millis(10),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn sleep_attentively_poll_ge_timeout_just_sleeps() {
        let token = CancellationToken::new();
        let result = sleep_attentively(
            Duration::from_millis(5),
            &token,
            Duration::from_millis(50),
        );
        assert!(result.is_ok());
    }
}
