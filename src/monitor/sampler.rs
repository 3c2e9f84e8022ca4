//! Background sampling service.
//!
//! Samples instance memory on a fixed interval, independent of the
//! interaction path: launch/focus/messaging never wait on a pass. The shell
//! lock is held only to snapshot the live set and to record results - never
//! across a bridge probe, so one slow instance cannot stall the shell.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::interval;

use crate::shell::Shell;
use crate::types::Result;

/// Statistics from one sample pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplePassStats {
    /// Instances successfully sampled
    pub sampled: usize,
    /// Instances skipped (closed mid-sample or probe failed)
    pub skipped: usize,
    /// Closed registry records swept this pass
    pub records_swept: usize,
    /// When the pass completed
    pub completed_at: Option<DateTime<Utc>>,
}

/// Sampler drives periodic resource sampling for a shared Shell.
#[derive(Debug)]
pub struct Sampler {
    shell: Arc<Mutex<Shell>>,
    stop_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl Sampler {
    /// Create a new sampler. The interval comes from the shell's
    /// `ResourceLimits::sample_interval`.
    pub fn new(shell: Arc<Mutex<Shell>>) -> Self {
        Self {
            shell,
            stop_tx: None,
        }
    }

    /// Start the sampling loop in the background.
    /// Returns immediately; sampling runs in a spawned task.
    pub fn start(&mut self) -> tokio::task::JoinHandle<()> {
        let shell = self.shell.clone();
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        self.stop_tx = Some(stop_tx);

        tokio::spawn(async move {
            let period = { shell.lock().await.config().limits.sample_interval };
            let mut ticker = interval(period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = Self::run_sample_pass(&shell).await {
                            tracing::error!("sample_pass_failed: {}", e);
                        }
                    }
                    _ = &mut stop_rx => {
                        tracing::info!("sampler_stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Stop the sampling loop.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Run a single sample pass.
    ///
    /// Three phases: snapshot the live set (and sweep stale Closed records)
    /// under the shell lock, probe each instance's memory with the lock
    /// released, then re-lock and record only readings whose instance is
    /// still live - an instance closed mid-sample is skipped, not recorded.
    pub async fn run_sample_pass(shell: &Arc<Mutex<Shell>>) -> Result<SamplePassStats> {
        let mut stats = SamplePassStats::default();

        // Phase 1: snapshot + sweep
        let (apps, bridge) = {
            let mut s = shell.lock().await;
            stats.records_swept = s.sweep_closed();
            (s.live_apps(), s.bridge())
        };

        // Phase 2: probe memory, no shell lock held
        let readings = futures::future::join_all(apps.into_iter().map(|app| {
            let bridge = bridge.clone();
            async move {
                let reading = bridge.memory_usage(&app).await;
                (app, reading)
            }
        }))
        .await;

        // Phase 3: record
        let mut s = shell.lock().await;
        for (app, reading) in readings {
            match reading {
                Ok(bytes) if s.is_live(&app) => {
                    s.monitor_mut().record_sample(app, bytes);
                    stats.sampled += 1;
                }
                Ok(_) => {
                    stats.skipped += 1;
                }
                Err(e) => {
                    tracing::warn!("memory_probe_failed: app={}, error={}", app, e);
                    stats.skipped += 1;
                }
            }
        }

        tracing::debug!(
            "sample_pass_completed: sampled={}, skipped={}, swept={}",
            stats.sampled,
            stats.skipped,
            stats.records_swept,
        );

        stats.completed_at = Some(Utc::now());
        Ok(stats)
    }
}
