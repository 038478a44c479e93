//! Background runner
//!
//! Periodic driver for the publisher service: a processing tick every
//! `tick_interval_secs` and a daily maintenance tick, both on one task
//! so only a single tick can run at a time. The returned handle
//! supports stop, pause and resume.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;
use tracing::{error, info};

use super::PublisherService;

const DAILY_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Periodic driver
pub struct BackgroundRunner {
    service: Arc<PublisherService>,
}

impl BackgroundRunner {
    pub fn new(service: Arc<PublisherService>) -> Self {
        Self { service }
    }

    /// Spawn the driver task and return its handle.
    pub fn start(self) -> RunnerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let running = Arc::new(RwLock::new(true));
        let running_clone = running.clone();

        let service = self.service;
        let tick_interval = Duration::from_secs(service.config().tick_interval_secs.max(1));

        tokio::spawn(async move {
            let mut tick_timer = interval(tick_interval);
            let mut daily_timer = interval(DAILY_INTERVAL);

            info!(
                interval_secs = tick_interval.as_secs(),
                "Publisher runner started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Publisher runner received shutdown signal");
                        break;
                    }
                    _ = tick_timer.tick() => {
                        if *running_clone.read().await {
                            match service.run_tick().await {
                                Ok(result) if result.processed > 0 => {
                                    info!(
                                        processed = result.processed,
                                        succeeded = result.succeeded,
                                        failed = result.failed,
                                        duration_ms = result.duration_ms,
                                        "Processing tick finished"
                                    );
                                }
                                Ok(_) => {}
                                Err(e) => {
                                    error!(error = %e, "Processing tick failed");
                                }
                            }
                        }
                    }
                    _ = daily_timer.tick() => {
                        if *running_clone.read().await {
                            if let Err(e) = service.run_daily().await {
                                error!(error = %e, "Daily maintenance failed");
                            }
                        }
                    }
                }
            }

            info!("Publisher runner stopped");
        });

        RunnerHandle {
            shutdown_tx,
            running,
        }
    }
}

/// Handle to a running driver
pub struct RunnerHandle {
    shutdown_tx: mpsc::Sender<()>,
    running: Arc<RwLock<bool>>,
}

impl RunnerHandle {
    /// Stop the runner permanently.
    pub async fn stop(self) {
        *self.running.write().await = false;
        let _ = self.shutdown_tx.send(()).await;
    }

    /// Skip ticks until resumed.
    pub async fn pause(&self) {
        *self.running.write().await = false;
    }

    pub async fn resume(&self) {
        *self.running.write().await = true;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_runner_handle_pause_resume() {
        let (tx, _rx) = mpsc::channel(1);
        let handle = RunnerHandle {
            shutdown_tx: tx,
            running: Arc::new(RwLock::new(true)),
        };

        assert!(handle.is_running().await);
        handle.pause().await;
        assert!(!handle.is_running().await);
        handle.resume().await;
        assert!(handle.is_running().await);
    }
}
