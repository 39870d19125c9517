//! Session Shutdown Signal

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot shutdown signal shared by the two directions of a session.
///
/// A compare-and-set on the flag decides which direction terminated first,
/// so simultaneous termination from both ends has exactly one winner. This
/// is the only state shared across the two copiers; the hot loop never
/// takes a lock.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    fired: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns true if this caller was the first to fire.
    pub fn fire(&self) -> bool {
        let first = self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if first {
            self.notify.notify_waiters();
        }

        first
    }

    /// Whether the signal has fired
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Suspend until the signal fires. Returns immediately if it already has.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);

            // Register the waiter before checking the flag, so a fire()
            // racing with this call cannot be missed.
            notified.as_mut().enable();

            if self.is_fired() {
                return;
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn only_first_fire_wins() {
        let signal = ShutdownSignal::new();

        assert!(!signal.is_fired());
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_fired() {
        let signal = ShutdownSignal::new();
        signal.fire();

        timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("cancelled() should not block after fire()");
    }

    #[tokio::test]
    async fn waiter_is_woken_by_fire() {
        let signal = Arc::new(ShutdownSignal::new());

        let waiter = {
            let signal = Arc::clone(&signal);
            tokio::spawn(async move { signal.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        signal.fire();

        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake after fire()")
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_fires_have_one_winner() {
        let signal = Arc::new(ShutdownSignal::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let signal = Arc::clone(&signal);
            handles.push(tokio::spawn(async move { signal.fire() }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
    }
}
