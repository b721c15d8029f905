//! Background expiry sweeper
//!
//! Expired records are also dropped lazily on read; the sweeper bounds how
//! long an unread expired record keeps occupying the cache.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::MemoryStore;
use crate::error::{Result, StoreError};

/// Commands for the sweeper task
#[derive(Debug)]
pub enum SweepCommand {
    /// Sweep immediately
    SweepNow,
    /// Stop the sweeper
    Stop,
}

/// Handle to a running expiry sweeper
pub struct ExpirySweeper {
    sender: mpsc::Sender<SweepCommand>,
    handle: JoinHandle<()>,
}

impl ExpirySweeper {
    /// Start sweeping on the store's configured interval
    ///
    /// Returns `None` when the interval is zero.
    pub fn start(store: Arc<MemoryStore>) -> Option<Self> {
        let period = store.config().sweep_interval();
        if period.is_zero() {
            tracing::info!("expiry sweeper disabled");
            return None;
        }

        let (sender, mut receiver) = mpsc::channel::<SweepCommand>(16);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            tracing::info!(interval_secs = period.as_secs(), "expiry sweeper started");

            loop {
                tokio::select! {
                    cmd = receiver.recv() => match cmd {
                        Some(SweepCommand::SweepNow) => Self::sweep(&store).await,
                        Some(SweepCommand::Stop) | None => break,
                    },
                    _ = ticker.tick() => Self::sweep(&store).await,
                }
            }

            tracing::info!("expiry sweeper stopped");
        });

        Some(Self { sender, handle })
    }

    async fn sweep(store: &MemoryStore) {
        let removed = store.sweep_expired().await;
        if removed > 0 {
            tracing::debug!(removed, "swept expired records");
        }
    }

    /// Request an immediate sweep
    pub async fn sweep_now(&self) -> Result<()> {
        self.sender
            .send(SweepCommand::SweepNow)
            .await
            .map_err(|_| StoreError::Internal("sweeper channel closed".to_string()))
    }

    /// Stop the sweeper and wait for its task to finish
    pub async fn shutdown(self) -> Result<()> {
        // A closed channel means the task already exited
        let _ = self.sender.send(SweepCommand::Stop).await;
        self.handle
            .await
            .map_err(|e| StoreError::Internal(format!("sweeper task failed: {}", e)))
    }
}
