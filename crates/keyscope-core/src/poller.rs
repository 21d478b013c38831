//! Periodic key-count refresh for the statistics view.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::backend::KeyBackend;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Latest key-count reading.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CountReading {
    /// No request has completed yet
    #[default]
    Pending,
    Count(u64),
    Failed(String),
}

/// Background task polling the key count of one environment.
///
/// The first request fires immediately, then once per interval. Pausing
/// stops requests; resuming polls right away and restarts the interval.
/// Dropping the poller stops the task.
#[derive(Debug)]
pub struct CountPoller {
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
    readings: watch::Receiver<CountReading>,
    handle: JoinHandle<()>,
}

impl CountPoller {
    /// Start polling. Must be called from within a Tokio runtime.
    pub fn spawn<B: KeyBackend>(backend: Arc<B>, env: impl Into<String>, interval: Duration) -> Self {
        let env = env.into();
        let interval = interval.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let (paused_tx, paused_rx) = watch::channel(false);
        let (readings_tx, readings_rx) = watch::channel(CountReading::Pending);

        debug!("Polling key count of {env} every {interval:?}");
        let handle = tokio::spawn(poll(
            backend,
            env,
            interval,
            cancel.clone(),
            paused_rx,
            readings_tx,
        ));

        Self {
            cancel,
            paused: paused_tx,
            readings: readings_rx,
            handle,
        }
    }

    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Flip the pause flag; returns whether the poller is now paused.
    pub fn toggle_pause(&self) -> bool {
        let paused = !self.is_paused();
        self.paused.send_replace(paused);
        paused
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    #[must_use]
    pub fn latest(&self) -> CountReading {
        self.readings.borrow().clone()
    }

    /// Wait for the next reading. Returns `None` once the poller has stopped.
    pub async fn changed(&mut self) -> Option<CountReading> {
        self.readings.changed().await.ok()?;
        Some(self.readings.borrow_and_update().clone())
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CountReading> {
        self.readings.clone()
    }

    /// Cancel the timer and any request in flight.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CountPoller {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn poll<B: KeyBackend>(
    backend: Arc<B>,
    env: String,
    period: Duration,
    cancel: CancellationToken,
    mut paused: watch::Receiver<bool>,
    readings: watch::Sender<CountReading>,
) {
    let mut interval = ticker(period);

    loop {
        if *paused.borrow_and_update() {
            trace!("Count poller for {env} paused");
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = paused.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if !*paused.borrow() {
                interval = ticker(period);
            }
            continue;
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = paused.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = interval.tick() => {}
        }

        let reading = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = backend.key_count(&env) => match result {
                Ok(count) => CountReading::Count(count.count),
                Err(e) => {
                    warn!("Key count refresh for {env} failed: {e}");
                    CountReading::Failed(e.to_string())
                }
            },
        };
        trace!("Key count of {env}: {reading:?}");
        readings.send_replace(reading);
    }

    debug!("Count poller for {env} stopped");
}
