//! Single-fire rendezvous between the request that places a call and the
//! webhook that finishes it.
//!
//! One side calls [`Rendezvous::wait`] with a deadline; any other task may
//! call [`Rendezvous::signal`] any number of times. Only the first signal
//! counts, a signal that lands before the wait starts is not lost, and a
//! signal nobody waits for is harmless. The signal carries no data: waiters
//! re-read the call record after waking.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    fired: AtomicBool,
    notify: Notify,
}

/// Cloneable handle to a single-fire signal
#[derive(Debug, Clone, Default)]
pub struct Rendezvous {
    inner: Arc<Inner>,
}

impl Rendezvous {
    /// Create an unfired rendezvous
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns `true` only for the call that actually fired
    /// it; later calls are no-ops.
    pub fn signal(&self) -> bool {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.notify.notify_waiters();
        true
    }

    /// Whether the signal has fired
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Wait until the signal fires or `timeout` elapses.
    ///
    /// Returns `true` if the signal fired (possibly before this call),
    /// `false` on timeout.
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut notified = pin!(self.inner.notify.notified());
        // Register before checking the flag so a concurrent signal cannot
        // slip between the check and the await.
        notified.as_mut().enable();

        if self.is_fired() {
            return true;
        }

        match tokio::time::timeout(timeout, notified).await {
            Ok(()) => true,
            Err(_) => self.is_fired(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test]
    async fn test_signal_before_wait_is_not_lost() {
        let rv = Rendezvous::new();
        assert!(rv.signal());
        assert!(rv.wait(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_signal_is_idempotent() {
        let rv = Rendezvous::new();
        assert!(!rv.is_fired());
        assert!(rv.signal());
        assert!(!rv.signal());
        assert!(!rv.signal());
        assert!(rv.is_fired());
    }

    #[tokio::test]
    async fn test_waiter_wakes_on_signal() {
        let rv = Rendezvous::new();
        let mut waiter = task::spawn(rv.wait(Duration::from_secs(30)));
        assert_pending!(waiter.poll());

        assert!(rv.signal());
        assert!(waiter.is_woken());
        assert!(assert_ready!(waiter.poll()));
    }

    #[tokio::test]
    async fn test_second_signal_does_not_wake_again() {
        let rv = Rendezvous::new();
        let mut first = task::spawn(rv.wait(Duration::from_secs(30)));
        assert_pending!(first.poll());
        rv.signal();
        assert!(assert_ready!(first.poll()));

        let mut second = task::spawn(rv.wait(Duration::from_secs(30)));
        // Already fired: resolves immediately instead of waiting for a new signal.
        assert!(assert_ready!(second.poll()));
        assert!(!rv.signal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_signal() {
        let rv = Rendezvous::new();
        assert!(!rv.wait(Duration::from_secs(60)).await);
        assert!(!rv.is_fired());
    }

    #[tokio::test]
    async fn test_signal_from_another_task() {
        let rv = Rendezvous::new();
        let signaller = rv.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            signaller.signal()
        });

        assert!(rv.wait(Duration::from_secs(5)).await);
        assert!(handle.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_signal_after_timeout_is_harmless() {
        let rv = Rendezvous::new();
        assert!(!rv.wait(Duration::from_secs(1)).await);
        assert!(rv.signal());
        assert!(rv.is_fired());
    }
}
