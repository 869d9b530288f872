//! Periodic retry sweep over failed delivery attempts.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use otto_core::Clock;
use otto_store::PipelineStore;
use tracing::{info, warn};

use crate::delivery::DeliveryEngine;

/// Bounds for the at-least-once delivery guarantee: an attempt is retried at
/// most `max_retries` times within `window` of its creation, then parked as
/// a permanent failure for manual intervention.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub window: Duration,
    pub interval: StdDuration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            window: Duration::hours(24),
            interval: StdDuration::from_secs(300),
        }
    }
}

/// Outcome counts for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub resent: usize,
    pub still_failed: usize,
    pub exhausted: usize,
}

/// Re-drives failed deliveries on a fixed interval. The design assumes a
/// single active sweeper per deployment; concurrent sweepers need external
/// mutual exclusion.
pub struct RetrySweeper {
    store: Arc<dyn PipelineStore>,
    engine: Arc<DeliveryEngine>,
    policy: RetryPolicy,
    clock: Clock,
}

impl RetrySweeper {
    pub fn new(
        store: Arc<dyn PipelineStore>,
        engine: Arc<DeliveryEngine>,
        policy: RetryPolicy,
        clock: Clock,
    ) -> Self {
        Self {
            store,
            engine,
            policy,
            clock,
        }
    }

    /// Runs exactly one sweep. A no-op when nothing is retryable.
    pub async fn run_sweep(&self) -> SweepReport {
        let now = (self.clock)();
        let mut report = SweepReport::default();

        let attempts = match self
            .store
            .list_retryable_attempts(now, self.policy.window, self.policy.max_retries)
            .await
        {
            Ok(attempts) => attempts,
            Err(error) => {
                warn!(%error, "retry sweep could not list attempts");
                return report;
            }
        };
        report.scanned = attempts.len();

        for attempt in attempts {
            match self.engine.redeliver(&attempt).await {
                Ok(receipt) => {
                    // Resends keep the selection-time retry count, which then
                    // reads as the number of failed sweeps the row survived.
                    if let Err(error) = self
                        .store
                        .mark_attempt_resent(&attempt.attempt_id, attempt.retry_count)
                        .await
                    {
                        warn!(
                            attempt_id = %attempt.attempt_id,
                            %error,
                            "resend succeeded but could not be marked resent"
                        );
                        continue;
                    }
                    info!(
                        attempt_id = %attempt.attempt_id,
                        recipient = %attempt.recipient,
                        status = receipt.http_status,
                        "failed delivery resent"
                    );
                    report.resent += 1;
                }
                Err(failure) => {
                    let next_retry_count = attempt.retry_count + 1;
                    let permanent = next_retry_count >= self.policy.max_retries;
                    if let Err(error) = self
                        .store
                        .mark_attempt_retry_failed(
                            &attempt.attempt_id,
                            next_retry_count,
                            permanent,
                            &failure.to_string(),
                        )
                        .await
                    {
                        warn!(
                            attempt_id = %attempt.attempt_id,
                            %error,
                            "retry failure could not be recorded"
                        );
                        continue;
                    }
                    if permanent {
                        warn!(
                            attempt_id = %attempt.attempt_id,
                            recipient = %attempt.recipient,
                            retry_count = next_retry_count,
                            "retries exhausted, attempt parked as permanent failure"
                        );
                        report.exhausted += 1;
                    } else {
                        report.still_failed += 1;
                    }
                }
            }
        }

        report
    }

    /// Spawns the interval loop. Runs until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.policy.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = self.run_sweep().await;
                if report.scanned > 0 {
                    info!(
                        scanned = report.scanned,
                        resent = report.resent,
                        still_failed = report.still_failed,
                        exhausted = report.exhausted,
                        "retry sweep finished"
                    );
                }
            }
        })
    }
}
