use corral_api::{PoolEvent, PoolMonitor, PoolSnapshot};
use tracing::{debug, info, warn};

/// Reports pool events through `tracing`.
///
/// Lifecycle events log at `info`, failures at `warn`, per-item completions at
/// `debug`. With `include_snapshot` the snapshot is attached as a JSON field.
#[derive(Debug, Clone, Default)]
pub struct LoggingMonitor {
    include_snapshot: bool,
}

impl LoggingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshots() -> Self {
        Self {
            include_snapshot: true,
        }
    }

    fn snapshot_field(&self, snapshot: &PoolSnapshot) -> String {
        if !self.include_snapshot {
            return String::new();
        }
        serde_json::to_string(snapshot).unwrap_or_else(|e| format!("<unserializable: {}>", e))
    }
}

impl PoolMonitor for LoggingMonitor {
    fn on_event(&self, pool: &str, event: &PoolEvent, snapshot: &PoolSnapshot) {
        let stats = self.snapshot_field(snapshot);
        match event {
            PoolEvent::WorkerStarted { worker } => {
                info!(pool, worker = %worker, current = snapshot.current_threads, stats, "worker started");
            }
            PoolEvent::WorkerExited { worker, retired } => {
                info!(pool, worker = %worker, retired, current = snapshot.current_threads, stats, "worker exited");
            }
            PoolEvent::WorkerCreationFailed { reason } => {
                warn!(pool, reason = %reason, current = snapshot.current_threads, stats, "worker creation failed");
            }
            PoolEvent::WorkCompleted { work, elapsed_ms } => {
                debug!(pool, work = %work, elapsed_ms, busy = snapshot.busy_threads, stats, "work completed");
            }
            PoolEvent::WorkFailed { work, error } => {
                warn!(pool, work = %work, error = %error, failed = snapshot.failed_count, stats, "work failed");
            }
            PoolEvent::ShutdownComplete => {
                info!(pool, processed = snapshot.processed_count, stats, "shutdown complete");
            }
        }
    }
}
