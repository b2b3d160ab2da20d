use std::time::Duration;

use tracing::{error, info, warn};

use quill_types::api::{DistributionReport, RetryReport};

use crate::error::ApiError;
use crate::payment;
use crate::state::{AppState, blocking};

/// A failed credit grant is retried at most this many times.
pub const MAX_CREDIT_RETRIES: i64 = 5;

/// Grant the follow reward to the followed side of every follow edge.
/// One failing edge is logged and skipped.
pub async fn distribute_follow_credits(state: &AppState) -> Result<DistributionReport, ApiError> {
    let reward = state.config.follow_reward;
    blocking(state, move |db| {
        let mut report = DistributionReport { processed: 0, failed: 0 };
        for edge in db.all_follows()? {
            match db.grant_credit(&edge.following_id, reward) {
                Ok(Some(_)) => report.processed += 1,
                Ok(None) => {
                    warn!("Follow {} points at a missing account {}", edge.id, edge.following_id);
                    report.failed += 1;
                }
                Err(e) => {
                    error!("Follow reward for {} failed: {:#}", edge.id, e);
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    })
    .await
}

/// Re-attempt credit grants for paid transactions that never got their credit.
pub async fn retry_credit_grants(state: &AppState) -> Result<RetryReport, ApiError> {
    let candidates = blocking(state, |db| db.credit_retry_candidates(MAX_CREDIT_RETRIES)).await?;
    let mut report = RetryReport::default();

    for tx in candidates {
        report.attempted += 1;
        let order_id = tx.order_id.clone();
        let attempts = blocking(state, move |db| db.bump_retry_count(&order_id)).await?;

        if payment::grant_credits(state, &tx).await {
            let order_id = tx.order_id.clone();
            blocking(state, move |db| db.set_credit_error(&order_id, false)).await?;
            info!("Recovered credit grant for {} after {} attempts", tx.order_id, attempts);
            report.recovered += 1;
        } else if attempts >= MAX_CREDIT_RETRIES {
            error!("Giving up on credit grant for {} after {} attempts", tx.order_id, attempts);
            report.exhausted += 1;
        }
    }

    Ok(report)
}

/// Start the periodic follow-reward and credit-retry loops.
pub fn spawn(state: &AppState) {
    let config = &state.config;

    let s = state.clone();
    every(config.credit_distribution_interval, "follow credit distribution", move || {
        let s = s.clone();
        async move {
            distribute_follow_credits(&s)
                .await
                .map(|r| format!("{} processed, {} failed", r.processed, r.failed))
        }
    });

    let s = state.clone();
    every(config.credit_retry_interval, "credit grant retry", move || {
        let s = s.clone();
        async move {
            retry_credit_grants(&s).await.map(|r| {
                format!("{} attempted, {} recovered, {} exhausted", r.attempted, r.recovered, r.exhausted)
            })
        }
    });
}

/// Run `job` on a fixed interval forever. The first run happens one period
/// after startup.
fn every<F, Fut>(period: Duration, name: &'static str, job: F)
where
    F: Fn() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<String, ApiError>> + Send + 'static,
{
    if period.is_zero() {
        error!("{} not scheduled: zero interval", name);
        return;
    }
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match job().await {
                Ok(summary) => info!("{}: {}", name, summary),
                Err(e) => error!("{} failed: {:?}", name, e),
            }
        }
    });
}
