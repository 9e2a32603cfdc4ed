//! Driver loop.
//!
//! Runs one sweep at startup, then waits on the [`Trigger`] between sweeps.
//! Shutdown requests are only observed while idle, so a sweep that has
//! started always runs to completion. The current [`DriverState`] is
//! published on a watch channel for callers that need to observe it.

use chrono::Local;
use tokio::sync::watch;

use crate::sweep::Reconciler;
use crate::trigger::Trigger;

/// What the driver is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Waiting for the next trigger.
    Idle,

    /// Running a sweep.
    Sweeping,
}

/// Drives periodic sweeps until shutdown.
#[derive(Debug)]
pub struct Driver {
    reconciler: Reconciler,
    trigger: Trigger,
    state: watch::Sender<DriverState>,
    sweeps: usize,
}

impl Driver {
    /// Creates a driver.
    pub fn new(reconciler: Reconciler, trigger: Trigger) -> Self {
        let (state, _) = watch::channel(DriverState::Idle);
        Self {
            reconciler,
            trigger,
            state,
            sweeps: 0,
        }
    }

    /// Subscribes to state changes. The receiver outlives the driver and
    /// reports a closed channel once [`Driver::run`] returns.
    pub fn subscribe(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    /// Runs until `shutdown` becomes `true` or its sender is dropped.
    ///
    /// Returns the number of sweeps performed.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> usize {
        tracing::info!(trigger = ?self.trigger, "Starting swarmsync driver");
        self.sweep().await;

        let mut last_minute = None;
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let wait = self.trigger.next_wait(&Local::now());
            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            let now = Local::now();
            if matches!(self.trigger, Trigger::Schedule(_)) {
                // Guards against waking twice within the same minute.
                let minute = Trigger::minute_of(&now);
                if minute.is_some() && minute == last_minute {
                    continue;
                }
                last_minute = minute;
            }

            if self.trigger.is_due(&now) {
                self.sweep().await;
            }
        }

        tracing::info!(sweeps = self.sweeps, "swarmsync driver stopped");
        self.sweeps
    }

    async fn sweep(&mut self) {
        self.state.send_replace(DriverState::Sweeping);
        self.sweeps += 1;

        match self.reconciler.sweep().await {
            Ok(report) => {
                tracing::info!(
                    sweep_id = %report.sweep_id,
                    updated = report.updated(),
                    unchanged = report.unchanged(),
                    skipped = report.skipped(),
                    warnings = report.warnings.len(),
                    "Sweep finished"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Sweep failed");
            }
        }

        self.state.send_replace(DriverState::Idle);
    }
}
