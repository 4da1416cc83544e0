//! Drain workers
//!
//! One long-lived worker task per identity runs that identity's drains in
//! order. A drain polls the blocked old generation in bounded ticks until it
//! is quiescent or the timeout runs out, then publishes the new generation
//! either way.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use poolmux_core::{LifecycleState, PoolIdentity};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::Publisher;
use crate::pool::PhysicalPool;

/// Summary of a finished drain-and-swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub drain_id: Uuid,
    pub identity: PoolIdentity,
    /// Version published by the swap
    pub version: u64,
    /// The old generation went quiet before the timeout
    pub drained_cleanly: bool,
    pub waited: Duration,
    pub completed_at: DateTime<Utc>,
}

/// Resolves once the background swap is done.
#[derive(Debug)]
pub struct DrainHandle {
    drain_id: Uuid,
    rx: oneshot::Receiver<DrainReport>,
}

impl DrainHandle {
    pub(crate) fn new(drain_id: Uuid, rx: oneshot::Receiver<DrainReport>) -> Self {
        Self { drain_id, rx }
    }

    pub fn drain_id(&self) -> Uuid {
        self.drain_id
    }

    /// Wait for the swap. `None` if the worker went away without reporting.
    pub async fn completed(self) -> Option<DrainReport> {
        self.rx.await.ok()
    }
}

pub(crate) struct DrainJob {
    pub drain_id: Uuid,
    pub identity: PoolIdentity,
    pub old: Arc<PhysicalPool>,
    pub fresh: Arc<PhysicalPool>,
    pub timeout: Duration,
    /// The identity's lock, released once the swap is published
    pub guard: OwnedMutexGuard<()>,
    pub reply: oneshot::Sender<DrainReport>,
}

#[derive(Clone)]
pub(crate) struct DrainContext {
    pub publisher: Publisher,
    pub tick: Duration,
    pub state: Arc<RwLock<LifecycleState>>,
}

pub(crate) struct DrainWorker {
    tx: mpsc::Sender<DrainJob>,
}

impl DrainWorker {
    /// Start the worker. It stops once the worker handle is dropped and
    /// queued jobs are done.
    pub(crate) fn spawn(identity: PoolIdentity, capacity: usize, context: DrainContext) -> Self {
        let (tx, mut rx) = mpsc::channel::<DrainJob>(capacity.max(1));
        tokio::spawn(async move {
            debug!(pool = %identity, "[DrainWorker] Started");
            while let Some(job) = rx.recv().await {
                run_drain(job, &context).await;
            }
            debug!(pool = %identity, "[DrainWorker] Stopped");
        });
        Self { tx }
    }

    /// Queue a job; hands it back if the worker cannot take it.
    pub(crate) fn dispatch(&self, job: DrainJob) -> Result<(), DrainJob> {
        self.tx.try_send(job).map_err(|e| e.into_inner())
    }
}

pub(crate) async fn run_drain(job: DrainJob, context: &DrainContext) -> DrainReport {
    let DrainJob {
        drain_id,
        identity,
        old,
        fresh,
        timeout,
        guard,
        reply,
    } = job;

    let started = Instant::now();
    let deadline = started + timeout;
    let mut drained = old.is_quiescent();
    while !drained {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        drained = old.wait_quiescent(remaining.min(context.tick)).await;
        if !drained {
            let snapshot = old.snapshot();
            debug!(
                pool = %identity,
                drain_id = %drain_id,
                used = snapshot.used,
                waiting = snapshot.wait_queue_length,
                remaining_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
                "[DrainWorker] Still draining"
            );
        }
    }
    let waited = started.elapsed();

    if !drained {
        warn!(
            pool = %identity,
            drain_id = %drain_id,
            waited_ms = waited.as_millis() as u64,
            "[DrainWorker] Drain timed out, swapping with connections still in use"
        );
    }

    let version = match context
        .publisher
        .install(&identity, fresh.clone(), Some(drain_id), drained)
    {
        Ok(version) => version,
        Err(e) => {
            error!(pool = %identity, error = %e, "[DrainWorker] Swap failed");
            fresh.close();
            0
        }
    };

    *context.state.write() = LifecycleState::Deployed;
    drop(guard);

    info!(
        pool = %identity,
        drain_id = %drain_id,
        version,
        drained_cleanly = drained,
        waited_ms = waited.as_millis() as u64,
        "[DrainWorker] Drain complete"
    );

    let report = DrainReport {
        drain_id,
        identity,
        version,
        drained_cleanly: drained,
        waited,
        completed_at: Utc::now(),
    };
    let _ = reply.send(report.clone());
    report
}
