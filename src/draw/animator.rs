//! Roll animation driver
//!
//! Cycles candidate prize names while the real result is produced elsewhere, then settles
//! on that result no sooner than the grace period. One task owns both timers, so stopping
//! silences ticking and polling together.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::debug;

pub const TICK_INTERVAL: Duration = Duration::from_millis(100);
pub const GRACE_PERIOD: Duration = Duration::from_millis(2000);
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_CANDIDATES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollState {
    Rolling,
    Settled(String),
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollTiming {
    pub tick: Duration,
    pub grace: Duration,
    pub poll: Duration,
}

impl Default for RollTiming {
    fn default() -> Self {
        Self {
            tick: TICK_INTERVAL,
            grace: GRACE_PERIOD,
            poll: POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RollAnimator {
    timing: RollTiming,
}

impl RollAnimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timing(timing: RollTiming) -> Self {
        Self { timing }
    }

    /// Start rolling. Must be called inside a tokio runtime.
    ///
    /// `result_poll` yields the final prize once known; blank strings count as not ready.
    /// Dropping the returned handle stops the animation.
    pub fn spawn<P, T, S>(
        &self,
        candidates: Vec<String>,
        mut result_poll: P,
        mut on_tick: T,
        on_settled: S,
    ) -> RollHandle
    where
        P: FnMut() -> Option<String> + Send + 'static,
        T: FnMut(&str) + Send + 'static,
        S: FnOnce(&str) + Send + 'static,
    {
        let timing = self.timing;
        let names: Vec<String> = candidates.into_iter().take(MAX_CANDIDATES).collect();
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(RollState::Rolling);
        let start = Instant::now();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(start + timing.tick, timing.tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut next_poll = start + timing.grace;
            let mut on_settled = Some(on_settled);
            let mut index = 0usize;

            let final_state = loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break RollState::Cancelled,
                    _ = sleep_until(next_poll) => {
                        match result_poll().filter(|r| !r.trim().is_empty()) {
                            Some(result) => {
                                if let Some(settle) = on_settled.take() {
                                    settle(&result);
                                }
                                break RollState::Settled(result);
                            }
                            None => next_poll += timing.poll,
                        }
                    }
                    _ = ticker.tick(), if !names.is_empty() => {
                        on_tick(&names[index % names.len()]);
                        index += 1;
                    }
                }
            };

            debug!(state = ?final_state, ticks = index, "roll finished");
            state_tx.send_replace(final_state.clone());
            final_state
        });

        RollHandle {
            stop_tx,
            state_rx,
            task,
        }
    }
}

pub struct RollHandle {
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<RollState>,
    task: JoinHandle<RollState>,
}

impl RollHandle {
    /// Cancel both timers. No-op once settled.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    pub fn state(&self) -> RollState {
        self.state_rx.borrow().clone()
    }

    /// Wait for the animation to settle or be stopped.
    pub async fn finished(self) -> RollState {
        let RollHandle { stop_tx, task, .. } = self;
        let state = task.await.unwrap_or(RollState::Cancelled);
        drop(stop_tx);
        state
    }
}
