//! Active expiry for [`MemoryStore`].
//!
//! Reads drop an expired key when they touch it. A key that expires and is
//! never read again would stay in memory and in `len()`, so a background task
//! sweeps the shards periodically. The period shrinks while sweeps keep
//! finding a large share of expired keys and grows back while they find none.

use super::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Sweeper timing.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Period of the first sweep
    pub interval: Duration,
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// Share of keys that must expire in one sweep before the period halves
    pub busy_ratio: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            busy_ratio: 0.25,
        }
    }
}

impl ExpiryConfig {
    /// Period to wait after a sweep that removed `swept` of `population` keys.
    pub fn next_interval(&self, current: Duration, swept: u64, population: u64) -> Duration {
        if population == 0 {
            return current;
        }
        if swept as f64 / population as f64 > self.busy_ratio {
            (current / 2).max(self.min_interval)
        } else if swept == 0 {
            (current * 2).min(self.max_interval)
        } else {
            current
        }
    }
}

/// Handle to a running sweeper. Dropping it stops the task.
///
/// ```
/// use keydeck::store::{ExpiryConfig, ExpirySweeper, MemoryStore};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = Arc::new(MemoryStore::new());
/// let sweeper = ExpirySweeper::start(Arc::clone(&store), ExpiryConfig::default());
/// sweeper.shutdown().await;
/// # }
/// ```
#[derive(Debug)]
pub struct ExpirySweeper {
    stop: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current Tokio runtime.
    pub fn start(store: Arc<MemoryStore>, config: ExpiryConfig) -> Self {
        let (stop, stopped) = watch::channel(false);
        let task = tokio::spawn(run(store, config, stopped));
        info!("Expiry sweeper started");
        Self {
            stop,
            task: Some(task),
        }
    }

    /// Stops the task and waits for it to finish its current sweep.
    pub async fn shutdown(mut self) {
        let _ = self.stop.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
    }
}

async fn run(store: Arc<MemoryStore>, config: ExpiryConfig, mut stopped: watch::Receiver<bool>) {
    let mut interval = config.interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stopped.changed() => break,
        }

        let population = store.len();
        let swept = store.cleanup_expired();
        let next = config.next_interval(interval, swept, population);

        if swept > 0 {
            debug!(
                swept,
                remaining = store.len(),
                total_expired = store.expired_count(),
                next_ms = next.as_millis() as u64,
                "Swept expired keys"
            );
        } else if next != interval {
            trace!(next_ms = next.as_millis() as u64, "Nothing expired, backing off");
        }
        interval = next;
    }

    debug!("Expiry sweeper stopped");
}
