//! Periodic rule evaluation against the metrics registry

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use super::engine::AlertEngine;
use crate::metrics::MetricsRegistry;

/// Background worker that checks metric-backed rules against a snapshot
///
/// Each tick builds [`MetricsRegistry::snapshot`] and hands it to
/// [`AlertEngine::check_metrics`], so a rule path such as `cpu.avg` resolves
/// against the current summary of metric `cpu`. Rules whose data only ever
/// arrives through `check_alert` are left alone.
pub struct AlertWorker {
    engine: Arc<AlertEngine>,
    registry: Arc<MetricsRegistry>,
    interval: Duration,
    running: Arc<AtomicBool>,
}

impl AlertWorker {
    pub fn new(engine: Arc<AlertEngine>, registry: Arc<MetricsRegistry>, interval: Duration) -> Self {
        Self {
            engine,
            registry,
            interval,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("Alert worker started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }

                let fired = self.run_once().await;
                if fired > 0 {
                    tracing::info!("Alert worker fired {} rules", fired);
                }
            }

            tracing::info!("Alert worker stopped");
        })
    }

    /// Stop the worker
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if worker is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Evaluate metric-backed rules once; returns how many fired
    pub async fn run_once(&self) -> usize {
        let snapshot = self.registry.snapshot();
        self.engine.check_metrics(&snapshot).await
    }
}
