//! Fixed-interval driver for gate checks

use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Runs a callback on a tokio interval until it breaks or the ticker is stopped.
///
/// Dropping the ticker aborts the task, so a host that re-registers the ticker
/// on every play-state change never leaves a stale one behind.
#[derive(Debug)]
pub struct GateTicker {
    handle: JoinHandle<()>,
}

impl GateTicker {
    pub fn start<F>(interval: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if on_tick().is_break() {
                    debug!("Gate ticker finished");
                    break;
                }
            }
        });
        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for GateTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let ticker = GateTicker::start(Duration::from_millis(100), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });

        settle().await;
        tokio::time::sleep(Duration::from_millis(350)).await;
        settle().await;
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 3, "expected at least 3 ticks, saw {seen}");

        ticker.stop();
        settle().await;
        let stopped_at = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), stopped_at);
        assert!(!ticker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_ends_task() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let ticker = GateTicker::start(Duration::from_millis(100), move || {
            if counter.fetch_add(1, Ordering::SeqCst) >= 1 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        tokio::time::sleep(Duration::from_millis(1000)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!ticker.is_running());
    }
}
