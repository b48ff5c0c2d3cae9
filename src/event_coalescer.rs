//! Event coalescer (component D, §4.D).
//!
//! Collapses a burst of configuration-change notifications into at most one
//! callback invocation per fixed tick, the way
//! `original_source/eventlimiter.go` does with three goroutines
//! (`maintainTicker`, `maintainTrigger`, `limit`) — collapsed here into one
//! task with two logical pumps, since Tokio's `select!` lets a single loop
//! body do what Go's `EventLimiter` needed three for.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

/// Handle publishers use to pulse the coalescer. Cheap to clone.
#[derive(Clone)]
pub struct EventCoalescer {
    trigger_tx: mpsc::Sender<()>,
}

impl EventCoalescer {
    /// Spawn the coalescer task. `f` runs at most once per `period`, and
    /// only after at least one `trigger()` call since the last run.
    pub fn spawn<F, Fut>(period: Duration, f: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // Interval's first tick fires immediately; consume it so the
            // first real invocation still waits a full period, matching
            // "a lone trigger waits at most one tick" (§4.D).
            ticker.tick().await;

            loop {
                if trigger_rx.recv().await.is_none() {
                    break;
                }
                ticker.tick().await;
                f().await;
            }
        });

        Self { trigger_tx }
    }

    /// Non-blocking pulse; duplicates within the same tick are dropped
    /// silently (capacity-1 channel).
    pub fn trigger(&self) {
        let _ = self.trigger_tx.try_send(());
    }
}
