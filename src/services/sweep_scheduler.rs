use crate::services::DeductionService;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// Runs the deduction sweep on a fixed interval. Ticks are handled one at a
/// time, so two sweeps never overlap.
pub struct SweepScheduler {
    deduction_service: Arc<DeductionService>,
    interval: Duration,
}

impl SweepScheduler {
    pub fn new(deduction_service: Arc<DeductionService>, interval: Duration) -> Self {
        Self {
            deduction_service,
            interval,
        }
    }

    /// Run until `shutdown` resolves. The first sweep starts immediately.
    /// Returns the number of completed sweeps.
    pub async fn run_until<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut runs = 0;
        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!(runs = runs, "Sweep scheduler stopping");
                    return runs;
                }
                _ = ticker.tick() => {
                    match self.deduction_service.run_deduction_sweep().await {
                        Ok(report) => {
                            runs += 1;
                            info!(
                                processed = report.processed,
                                deducted = report.deducted,
                                no_credits = report.no_credits.len(),
                                errors = report.errors.len(),
                                "Scheduled deduction sweep finished"
                            );
                        }
                        // Whole batch rolled back; the next tick retries the same sessions
                        Err(e) => error!(code = e.code(), error = %e, "Scheduled deduction sweep failed"),
                    }
                }
            }
        }
    }
}
