//! Heartbeat: periodic liveness output so the CI platform does not kill a
//! long, quiet job.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Smallest interval accepted; `tokio::time::interval` panics on zero.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Heartbeat configuration.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    label: String,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(label: impl Into<String>, interval: Duration) -> Self {
        Self {
            label: label.into(),
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Start emitting `heartbeat <label> <timestamp>` lines on stdout.
    pub fn start(&self) -> HeartbeatHandle {
        let label = self.label.clone();
        self.start_with(move |at| {
            println!(
                "heartbeat {} {}",
                label,
                at.to_rfc3339_opts(SecondsFormat::Secs, true)
            );
        })
    }

    /// Start the heartbeat with a custom sink. The sink is called once per
    /// interval, the first time one full interval after start.
    pub fn start_with<F>(&self, mut emit: F) -> HeartbeatHandle
    where
        F: FnMut(DateTime<Utc>) + Send + 'static,
    {
        let interval = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                emit(Utc::now());
            }
        });

        tracing::debug!(
            label = %self.label,
            interval_ms = interval.as_millis() as u64,
            "Heartbeat started"
        );
        HeartbeatHandle {
            handle: Some(handle),
        }
    }
}

/// Handle to a running heartbeat. Stopping is idempotent; dropping the
/// handle stops the heartbeat as well.
#[derive(Debug)]
pub struct HeartbeatHandle {
    handle: Option<JoinHandle<()>>,
}

impl HeartbeatHandle {
    /// Stop the heartbeat. Returns `true` if this call stopped it, `false`
    /// if it was already stopped.
    pub fn stop(&mut self) -> bool {
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                tracing::debug!("Heartbeat stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
