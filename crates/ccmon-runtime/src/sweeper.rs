//! Liveness sweeper: periodically probes every tracked pid and removes
//! sessions whose process is gone, alerting through the notification gateway.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::config::{DaemonConfig, Scenario};
use crate::notify::NotificationGateway;
use crate::state::{AppState, SharedRegistry};

/// Trait for checking process liveness. Enables mock injection for testing.
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Signal-0 probe. Any failure counts as dead, including `EPERM` for a
/// process owned by another user.
pub struct SignalProbe;

impl ProcessProbe for SignalProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(pid) = i32::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }
        #[cfg(unix)]
        {
            // SAFETY: signal 0 performs only the existence/permission check.
            unsafe { libc::kill(pid, 0) == 0 }
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub reaped: Vec<u32>,
    pub notify_failures: usize,
}

#[derive(Clone)]
struct SweepContext {
    registry: SharedRegistry,
    probe: Arc<dyn ProcessProbe>,
    gateway: NotificationGateway,
    config: Arc<DaemonConfig>,
    sweeps: Arc<AtomicU64>,
}

impl SweepContext {
    async fn sweep_once(&self) -> SweepReport {
        // Probe outside the lock so API calls are not held up by the scan.
        let snapshot = self.registry.lock().await.all();
        let mut report = SweepReport {
            checked: snapshot.len(),
            ..SweepReport::default()
        };

        for session in snapshot {
            if self.probe.is_alive(session.pid) {
                continue;
            }
            let reaped = {
                let mut registry = self.registry.lock().await;
                // The pid may have been re-registered by a live process since
                // the snapshot.
                !self.probe.is_alive(session.pid) && registry.delete(session.pid, Utc::now())
            };
            if !reaped {
                continue;
            }
            tracing::info!(pid = session.pid, project = %session.project, "removed dead session");
            report.reaped.push(session.pid);

            let Some(alert) = self.config.alert(
                Scenario::SessionEnd,
                "Claude Monitor - Session terminated abnormally",
                &format!("{} (PID {})", session.project, session.pid),
            ) else {
                continue;
            };
            if let Err(e) = self.gateway.deliver(alert).await {
                tracing::warn!(pid = session.pid, error = %e, "failed to send notification");
                report.notify_failures += 1;
            }
        }

        let n = self.sweeps.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(sweep = n, checked = report.checked, reaped = report.reaped.len(), "sweep done");
        report
    }
}

struct RunningSweep {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Sweeper {
    ctx: SweepContext,
    period: Duration,
    running: Option<RunningSweep>,
}

impl Sweeper {
    pub fn new(state: &AppState, probe: Arc<dyn ProcessProbe>) -> Self {
        Self {
            ctx: SweepContext {
                registry: Arc::clone(&state.registry),
                probe,
                gateway: state.gateway.clone(),
                config: Arc::clone(&state.config),
                sweeps: Arc::new(AtomicU64::new(0)),
            },
            period: state.config.check_interval(),
            running: None,
        }
    }

    /// Spawn the sweep task. A second call while running is a no-op.
    pub fn start(&mut self) {
        if self.running.is_some() {
            tracing::info!("sweeper already running");
            return;
        }
        tracing::info!(interval_ms = self.period.as_millis() as u64, "starting liveness sweeper");
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_sweeps(self.ctx.clone(), self.period, cancel.clone()));
        self.running = Some(RunningSweep { cancel, handle });
    }

    /// Cancel the sweep task and wait for an in-flight sweep to finish.
    /// Silent when not running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            tracing::warn!(error = %e, "sweeper task ended abnormally");
        }
        tracing::info!("liveness sweeper stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub async fn sweep_once(&self) -> SweepReport {
        self.ctx.sweep_once().await
    }

    #[cfg(test)]
    fn sweeps_completed(&self) -> u64 {
        self.ctx.sweeps.load(Ordering::Relaxed)
    }
}

async fn run_sweeps(ctx: SweepContext, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick fires immediately; the first sweep happens one period in.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                ctx.sweep_once().await;
            }
        }
    }
}
