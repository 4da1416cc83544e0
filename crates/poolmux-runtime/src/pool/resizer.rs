//! Background resizer task, one per pool generation.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::physical::PhysicalPool;

/// Run `resize_now` every `period` until the token is cancelled or the pool
/// is dropped. Holds only a weak reference so it never keeps a pool alive.
pub(crate) fn spawn(
    pool: &Arc<PhysicalPool>,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    let weak: Weak<PhysicalPool> = Arc::downgrade(pool);
    let identity = pool.identity().clone();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(pool) = weak.upgrade() else { break };
                    let report = pool.resize_now().await;
                    if report.is_noop() {
                        trace!(pool = %identity, "[Resizer] Nothing to do");
                    } else {
                        debug!(
                            pool = %identity,
                            destroyed_idle = report.destroyed_idle,
                            created = report.created,
                            leak_suspects = report.leak_suspects.len(),
                            "[Resizer] Pass complete"
                        );
                    }
                }
            }
        }

        trace!(pool = %identity, "[Resizer] Stopped");
    })
}
