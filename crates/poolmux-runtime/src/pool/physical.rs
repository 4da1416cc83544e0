//! PhysicalPool - one configuration generation of live connections
//!
//! All bookkeeping (free set, counters, both wait queues, leases) lives in a
//! single `parking_lot` mutex that is never held across an await point.
//! Factory calls happen outside the lock against slots reserved under it, so
//! `total` always counts free, leased and in-creation connections and never
//! exceeds the configured maximum.
//!
//! Hand-off is direct: a returned connection goes to the head of the
//! admission queue as a ready lease, and a freed slot goes there as a
//! reservation. Both are guards, so a caller that disappears after being
//! signalled gives them back instead of leaking them.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use poolmux_core::{
    EventSender, PoolConfiguration, PoolError, PoolEvent, PoolIdentity, PoolResult,
};
use serde::Serialize;
use tokio::sync::{oneshot, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::PooledConnection;
use super::factory::{ConnectionFactory, ManagedConnection};
use super::resizer;
use super::wait_queue::WaitQueue;

/// A physical connection with its pool bookkeeping.
pub(crate) struct IdleConnection {
    pub(crate) id: u64,
    pub(crate) connection: Box<dyn ManagedConnection>,
    pub(crate) created_at: Instant,
    pub(crate) last_used: Instant,
    pub(crate) usage_count: u32,
    pub(crate) last_validated: Option<Instant>,
}

/// What a parked caller is woken with.
pub(crate) enum WaitSignal {
    Granted(PooledConnection),
    Reserved(SlotReservation),
    /// Conditions changed, look again
    Retry,
    /// This generation was replaced
    Reconfigured,
    Undeployed,
}

/// One slot counted in `total` whose connection is still to be created.
///
/// A leased slot also counts in `used`: it belongs to a caller who gets the
/// connection. Dropping the reservation before it is claimed gives the slot
/// back and passes it on to the next parked caller, so an acquire that is
/// cancelled mid-creation leaves the counters as they were.
pub(crate) struct SlotReservation {
    pool: Arc<PhysicalPool>,
    leased: bool,
    armed: bool,
}

impl SlotReservation {
    fn leased(pool: Arc<PhysicalPool>) -> Self {
        Self {
            pool,
            leased: true,
            armed: true,
        }
    }

    fn prefill(pool: Arc<PhysicalPool>) -> Self {
        Self {
            pool,
            leased: false,
            armed: true,
        }
    }

    /// The slot is now backed by a connection.
    pub(crate) fn claim(mut self) {
        self.armed = false;
    }
}

impl Drop for SlotReservation {
    fn drop(&mut self) {
        if self.armed {
            self.pool.release_slot(self.leased);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Active,
    Retired,
    Closed,
}

#[derive(Debug, Clone, Copy)]
enum QueueKind {
    Admission,
    Reconfig,
}

struct Lease {
    since: Instant,
    reported: bool,
}

struct PoolState {
    config: Arc<PoolConfiguration>,
    free: VecDeque<IdleConnection>,
    total: u32,
    used: u32,
    admission: WaitQueue<WaitSignal>,
    reconfig: WaitQueue<WaitSignal>,
    blocked_until: Option<Instant>,
    phase: Phase,
    leases: HashMap<u64, Lease>,
    next_connection_id: u64,
    steady_filled: bool,
}

impl PoolState {
    fn is_blocked(&self, now: Instant) -> bool {
        self.blocked_until.is_some_and(|until| now < until)
    }

    fn is_quiescent(&self) -> bool {
        self.used == 0 && self.admission.is_empty()
    }

    /// Connections to create when nothing is free: fill to steady first,
    /// then grow by the resize quantum, never past the maximum.
    fn growth(&self) -> u32 {
        let max = self.config.max_pool_size;
        if self.total >= max {
            return 0;
        }
        if !self.config.pooling_enabled {
            return 1;
        }
        let wanted = if self.total < self.config.steady_pool_size {
            self.config.steady_pool_size - self.total
        } else {
            self.config.resize_quantity
        };
        wanted.max(1).min(max - self.total)
    }

    fn check_out(&mut self, id: u64, now: Instant) {
        self.used += 1;
        self.leases.insert(
            id,
            Lease {
                since: now,
                reported: false,
            },
        );
    }

    fn check_in(&mut self, id: u64) {
        self.used = self.used.saturating_sub(1);
        self.leases.remove(&id);
    }

    fn wrap(&mut self, connection: Box<dyn ManagedConnection>, now: Instant) -> IdleConnection {
        self.next_connection_id += 1;
        IdleConnection {
            id: self.next_connection_id,
            connection,
            created_at: now,
            last_used: now,
            usage_count: 0,
            last_validated: None,
        }
    }
}

enum Step {
    Ready(PooledConnection),
    /// The caller creates its own connection; `prefill` more are wanted
    /// once it has it.
    Create {
        slot: SlotReservation,
        prefill: u32,
    },
    Park {
        ticket: u64,
        rx: oneshot::Receiver<WaitSignal>,
        queue: QueueKind,
    },
}

/// Point-in-time counters of one pool generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub pool_id: Uuid,
    pub size: u32,
    pub used: u32,
    pub free: u32,
    pub wait_queue_length: usize,
    pub reconfig_wait_queue_length: usize,
    pub blocked: bool,
    pub retired: bool,
    pub steady_pool_size: u32,
    pub max_pool_size: u32,
}

/// Outcome of one resizer pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResizeReport {
    pub destroyed_idle: usize,
    pub created: usize,
    pub leak_suspects: Vec<u64>,
    pub skipped: bool,
}

impl ResizeReport {
    pub fn is_noop(&self) -> bool {
        self.destroyed_idle == 0 && self.created == 0 && self.leak_suspects.is_empty()
    }
}

pub struct PhysicalPool {
    id: Uuid,
    identity: PoolIdentity,
    factory: Arc<dyn ConnectionFactory>,
    state: Mutex<PoolState>,
    quiescence: Notify,
    events: EventSender,
    shutdown: CancellationToken,
}

impl PhysicalPool {
    /// Build an empty pool. Connections are created lazily on first use.
    ///
    /// With a resizer interval and a running tokio runtime, a background
    /// resizer is started for the lifetime of the pool.
    pub fn new(
        identity: PoolIdentity,
        config: PoolConfiguration,
        factory: Arc<dyn ConnectionFactory>,
        events: EventSender,
        resizer_interval: Option<Duration>,
    ) -> Arc<Self> {
        let pool = Arc::new(Self {
            id: Uuid::new_v4(),
            identity,
            factory,
            state: Mutex::new(PoolState {
                config: Arc::new(config),
                free: VecDeque::new(),
                total: 0,
                used: 0,
                admission: WaitQueue::new(),
                reconfig: WaitQueue::new(),
                blocked_until: None,
                phase: Phase::Active,
                leases: HashMap::new(),
                next_connection_id: 0,
                steady_filled: false,
            }),
            quiescence: Notify::new(),
            events,
            shutdown: CancellationToken::new(),
        });

        if let Some(interval) = resizer_interval {
            match tokio::runtime::Handle::try_current() {
                Ok(_) => {
                    resizer::spawn(&pool, interval, pool.shutdown.child_token());
                }
                Err(_) => warn!(
                    pool = %pool.identity,
                    "[PhysicalPool] No tokio runtime, idle resizer not started"
                ),
            }
        }

        debug!(
            pool = %pool.identity,
            pool_id = %pool.id,
            factory = %pool.factory.description(),
            "[PhysicalPool] Created"
        );
        pool
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &PoolIdentity {
        &self.identity
    }

    pub fn config(&self) -> Arc<PoolConfiguration> {
        self.state.lock().config.clone()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock();
        PoolSnapshot {
            pool_id: self.id,
            size: state.total,
            used: state.used,
            free: state.free.len() as u32,
            wait_queue_length: state.admission.len(),
            reconfig_wait_queue_length: state.reconfig.len(),
            blocked: state.is_blocked(Instant::now()),
            retired: state.phase != Phase::Active,
            steady_pool_size: state.config.steady_pool_size,
            max_pool_size: state.config.max_pool_size,
        }
    }

    /// No caller holds or waits for a connection of this generation.
    pub fn is_quiescent(&self) -> bool {
        self.state.lock().is_quiescent()
    }

    // =========================================================================
    // Acquire / release
    // =========================================================================

    /// Obtain a connection within `timeout`.
    ///
    /// Parks on the admission queue when the pool is at capacity, or on the
    /// reconfiguration queue while requests are blocked for a drain.
    pub async fn acquire(self: &Arc<Self>, timeout: Duration) -> PoolResult<PooledConnection> {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            let signal = match self.next_step()? {
                Step::Ready(lease) => {
                    if let Some(lease) = self.validated(lease).await {
                        return Ok(lease);
                    }
                    continue;
                }
                Step::Create { slot, prefill } => {
                    return self.create_for_caller(slot, prefill, started, deadline).await;
                }
                Step::Park {
                    ticket,
                    mut rx,
                    queue,
                } => match tokio::time::timeout_at(deadline, &mut rx).await {
                    Ok(Ok(signal)) => signal,
                    Ok(Err(_)) => continue,
                    Err(_) => match self.abandon(queue, ticket, &mut rx) {
                        Some(signal) => signal,
                        None => {
                            debug!(
                                pool = %self.identity,
                                queue = ?queue,
                                waited_ms = started.elapsed().as_millis() as u64,
                                "[PhysicalPool] Acquire timed out"
                            );
                            return Err(PoolError::PoolTimeout {
                                identity: self.identity.clone(),
                                waited: started.elapsed(),
                            });
                        }
                    },
                },
            };

            match signal {
                WaitSignal::Granted(lease) => {
                    if let Some(lease) = self.validated(lease).await {
                        return Ok(lease);
                    }
                }
                WaitSignal::Reserved(slot) => {
                    return self.create_for_caller(slot, 0, started, deadline).await;
                }
                WaitSignal::Retry => {}
                WaitSignal::Reconfigured => {
                    return Err(PoolError::Reconfigured(self.identity.clone()));
                }
                WaitSignal::Undeployed => {
                    return Err(PoolError::PoolUndeployed(self.identity.clone()));
                }
            }
        }
    }

    fn next_step(self: &Arc<Self>) -> PoolResult<Step> {
        let now = Instant::now();
        let mut state = self.state.lock();
        match state.phase {
            Phase::Closed => return Err(PoolError::PoolUndeployed(self.identity.clone())),
            Phase::Retired => return Err(PoolError::Reconfigured(self.identity.clone())),
            Phase::Active => {}
        }

        if state.is_blocked(now) {
            let (ticket, rx) = state.reconfig.enqueue();
            debug!(
                pool = %self.identity,
                reconfig_waiters = state.reconfig.len(),
                "[PhysicalPool] Requests blocked, parked on reconfiguration queue"
            );
            return Ok(Step::Park {
                ticket,
                rx,
                queue: QueueKind::Reconfig,
            });
        }

        if let Some(idle) = state.free.pop_front() {
            state.check_out(idle.id, now);
            return Ok(Step::Ready(PooledConnection::new(self.clone(), idle)));
        }

        let growth = state.growth();
        if growth > 0 {
            state.total += 1;
            state.used += 1;
            state.steady_filled = true;
            return Ok(Step::Create {
                slot: SlotReservation::leased(self.clone()),
                prefill: growth - 1,
            });
        }

        let (ticket, rx) = state.admission.enqueue();
        Ok(Step::Park {
            ticket,
            rx,
            queue: QueueKind::Admission,
        })
    }

    /// Deregister a timed-out caller, or collect the signal that beat the timeout.
    fn abandon(
        &self,
        queue: QueueKind,
        ticket: u64,
        rx: &mut oneshot::Receiver<WaitSignal>,
    ) -> Option<WaitSignal> {
        let mut state = self.state.lock();
        let removed = match queue {
            QueueKind::Admission => state.admission.remove(ticket),
            QueueKind::Reconfig => state.reconfig.remove(ticket),
        };
        if removed {
            let quiet = state.is_quiescent();
            drop(state);
            if quiet {
                self.quiescence.notify_waiters();
            }
            return None;
        }
        drop(state);
        rx.try_recv().ok()
    }

    async fn validated(&self, mut lease: PooledConnection) -> Option<PooledConnection> {
        let config = self.config();
        if !config.validation_required {
            return Some(lease);
        }
        let now = Instant::now();
        let period = config.validate_at_most_once_period;
        if !period.is_zero()
            && lease
                .last_validated()
                .is_some_and(|at| now.saturating_duration_since(at) < period)
        {
            return Some(lease);
        }
        if self
            .factory
            .validate(lease.connection_mut(), config.validation_method)
            .await
        {
            lease.mark_validated(now);
            return Some(lease);
        }
        warn!(
            pool = %self.identity,
            connection_id = lease.id(),
            method = config.validation_method.as_str(),
            "[PhysicalPool] Connection failed validation, discarding"
        );
        lease.discard();
        if config.fail_all_connections {
            let flushed = self.flush();
            warn!(
                pool = %self.identity,
                flushed,
                "[PhysicalPool] Validation failure fails all free connections"
            );
        }
        None
    }

    async fn create_for_caller(
        self: &Arc<Self>,
        slot: SlotReservation,
        prefill: u32,
        started: Instant,
        deadline: Instant,
    ) -> PoolResult<PooledConnection> {
        // Any early return drops `slot`, which gives the slot back.
        let connection = self.create_with_retry(started, deadline).await?;

        let now = Instant::now();
        let mut state = self.state.lock();
        if state.phase == Phase::Closed {
            drop(state);
            drop(slot);
            self.factory.destroy(connection);
            return Err(PoolError::PoolUndeployed(self.identity.clone()));
        }
        slot.claim();
        let idle = state.wrap(connection, now);
        state.leases.insert(
            idle.id,
            Lease {
                since: now,
                reported: false,
            },
        );
        let lease = PooledConnection::new(self.clone(), idle);
        let slots = self.reserve_prefill(&mut state, prefill);
        drop(state);

        self.spawn_prefill(slots);
        Ok(lease)
    }

    /// Each attempt is bounded by the caller's deadline; running out of it
    /// is a timeout, not a creation failure.
    async fn create_with_retry(
        &self,
        started: Instant,
        deadline: Instant,
    ) -> PoolResult<Box<dyn ManagedConnection>> {
        let config = self.config();
        let attempts = config.creation_retry_attempts.saturating_add(1);
        let mut made = 0;
        let mut last_error = None;

        for attempt in 1..=attempts {
            made = attempt;
            let created = match tokio::time::timeout_at(deadline, self.factory.create()).await {
                Ok(created) => created,
                Err(_) => {
                    warn!(
                        pool = %self.identity,
                        attempt,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "[PhysicalPool] Connection creation outlasted the acquire timeout"
                    );
                    return Err(PoolError::PoolTimeout {
                        identity: self.identity.clone(),
                        waited: started.elapsed(),
                    });
                }
            };
            match created {
                Ok(connection) => return Ok(connection),
                Err(e) => {
                    warn!(
                        pool = %self.identity,
                        attempt,
                        attempts,
                        error = %e,
                        "[PhysicalPool] Connection creation failed"
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        let resume = Instant::now() + config.creation_retry_interval;
                        if resume > deadline {
                            break;
                        }
                        tokio::time::sleep_until(resume).await;
                    }
                }
            }
        }

        let reason = last_error
            .map(|e| format!("{:#}", e))
            .unwrap_or_else(|| "no attempt made".to_string());
        self.events.emit(PoolEvent::ConnectionCreationFailed {
            identity: self.identity.clone(),
            attempts: made,
            reason: reason.clone(),
        });
        Err(PoolError::ConnectionCreationFailed {
            identity: self.identity.clone(),
            attempts: made,
            reason,
        })
    }

    /// Count up to `wanted` more slots for connections created in the background.
    fn reserve_prefill(self: &Arc<Self>, state: &mut PoolState, wanted: u32) -> Vec<SlotReservation> {
        if state.phase != Phase::Active || !state.config.pooling_enabled {
            return Vec::new();
        }
        let count = wanted.min(state.config.max_pool_size.saturating_sub(state.total));
        state.total += count;
        (0..count)
            .map(|_| SlotReservation::prefill(self.clone()))
            .collect()
    }

    fn spawn_prefill(self: &Arc<Self>, slots: Vec<SlotReservation>) {
        if slots.is_empty() {
            return;
        }
        debug!(
            pool = %self.identity,
            count = slots.len(),
            "[PhysicalPool] Pre-filling connections"
        );
        for slot in slots {
            let pool = self.clone();
            tokio::spawn(async move {
                pool.fill_one(slot).await;
            });
        }
    }

    /// Create the connection for a reserved slot, then hand it to the oldest
    /// waiter or park it as free.
    async fn fill_one(self: &Arc<Self>, slot: SlotReservation) -> bool {
        let connection = match self.factory.create().await {
            Ok(connection) => connection,
            Err(e) => {
                debug!(
                    pool = %self.identity,
                    error = %e,
                    "[PhysicalPool] Pre-filling connection failed"
                );
                return false;
            }
        };

        let mut state = self.state.lock();
        if state.phase != Phase::Active {
            drop(state);
            drop(slot);
            self.factory.destroy(connection);
            return false;
        }
        slot.claim();
        let idle = state.wrap(connection, Instant::now());
        if let Err(idle) = self.grant(&mut state, idle) {
            state.free.push_front(idle);
        }
        true
    }

    /// Return a leased connection. Called from the lease guard.
    pub(crate) fn check_in(self: &Arc<Self>, mut idle: IdleConnection, broken: bool) {
        let now = Instant::now();
        idle.usage_count += 1;
        idle.last_used = now;

        let (destroy, quiet) = {
            let mut state = self.state.lock();
            state.check_in(idle.id);
            let config = state.config.clone();
            let worn_out =
                config.max_connection_usage > 0 && idle.usage_count >= config.max_connection_usage;
            let discard = broken
                || worn_out
                || state.phase != Phase::Active
                || !config.pooling_enabled
                || state.total > config.max_pool_size;

            let destroy = if discard {
                state.total = state.total.saturating_sub(1);
                self.offer_slot(&mut state);
                Some(idle)
            } else {
                if let Err(idle) = self.grant(&mut state, idle) {
                    state.free.push_front(idle);
                }
                None
            };
            (destroy, state.is_quiescent())
        };

        if let Some(idle) = destroy {
            debug!(
                pool = %self.identity,
                connection_id = idle.id,
                usage_count = idle.usage_count,
                broken,
                "[PhysicalPool] Destroying returned connection"
            );
            self.factory.destroy(idle.connection);
        }
        if quiet {
            self.quiescence.notify_waiters();
        }
    }

    /// Give a counted slot back, passing it on to the next parked caller.
    pub(crate) fn release_slot(self: &Arc<Self>, leased: bool) {
        let quiet = {
            let mut state = self.state.lock();
            if leased {
                state.used = state.used.saturating_sub(1);
            }
            state.total = state.total.saturating_sub(1);
            self.offer_slot(&mut state);
            state.is_quiescent()
        };
        if quiet {
            self.quiescence.notify_waiters();
        }
    }

    /// Hand an idle connection to the oldest admission waiter.
    fn grant(self: &Arc<Self>, state: &mut PoolState, idle: IdleConnection) -> Result<(), IdleConnection> {
        if state.admission.is_empty() {
            return Err(idle);
        }
        let id = idle.id;
        state.check_out(id, Instant::now());
        let lease = PooledConnection::new(self.clone(), idle);
        match state.admission.hand_off(WaitSignal::Granted(lease)) {
            Ok(()) => Ok(()),
            Err(signal) => {
                state.check_in(id);
                match defuse(signal) {
                    Some(idle) => Err(idle),
                    None => Ok(()),
                }
            }
        }
    }

    /// Reserve a free slot for the oldest admission waiter, if there is room.
    fn offer_slot(self: &Arc<Self>, state: &mut PoolState) -> bool {
        if state.phase != Phase::Active
            || state.admission.is_empty()
            || state.total >= state.config.max_pool_size
        {
            return false;
        }
        state.total += 1;
        state.used += 1;
        let reservation = SlotReservation::leased(self.clone());
        match state.admission.hand_off(WaitSignal::Reserved(reservation)) {
            Ok(()) => true,
            Err(signal) => {
                defuse(signal);
                state.total -= 1;
                state.used -= 1;
                false
            }
        }
    }

    // =========================================================================
    // Coordinator operations
    // =========================================================================

    /// Stop admitting callers for `duration`; arrivals park on the
    /// reconfiguration queue. Existing leases and admission waiters are unaffected.
    pub fn block_requests(&self, duration: Duration) {
        let until = Instant::now() + duration;
        self.state.lock().blocked_until = Some(until);
        info!(
            pool = %self.identity,
            blocked_ms = duration.as_millis() as u64,
            "[PhysicalPool] Blocking new requests"
        );
    }

    /// Lift a block early; parked callers look again.
    pub fn unblock(&self) -> usize {
        let mut state = self.state.lock();
        state.blocked_until = None;
        state.reconfig.wake_all(|| WaitSignal::Retry)
    }

    /// Retire this generation after a newer one was published.
    ///
    /// Reconfiguration waiters are woken before admission waiters; both get
    /// `Reconfigured` and retry against the current generation. Free
    /// connections are destroyed now, leased ones when they come back.
    pub fn retire(&self) -> usize {
        let (free, woken) = {
            let mut state = self.state.lock();
            state.phase = Phase::Retired;
            state.blocked_until = None;
            let woken = state.reconfig.wake_all(|| WaitSignal::Reconfigured)
                + state.admission.wake_all(|| WaitSignal::Reconfigured);
            let free: Vec<_> = state.free.drain(..).collect();
            state.total = state.total.saturating_sub(free.len() as u32);
            (free, woken)
        };
        self.shutdown.cancel();
        let destroyed = free.len();
        for idle in free {
            self.factory.destroy(idle.connection);
        }
        self.quiescence.notify_waiters();
        info!(
            pool = %self.identity,
            pool_id = %self.id,
            woken,
            destroyed,
            "[PhysicalPool] Generation retired"
        );
        woken
    }

    /// Tear the pool down: parked callers are rejected with `PoolUndeployed`.
    pub fn close(&self) -> usize {
        let (free, rejected) = {
            let mut state = self.state.lock();
            state.phase = Phase::Closed;
            state.blocked_until = None;
            let rejected = state.reconfig.wake_all(|| WaitSignal::Undeployed)
                + state.admission.wake_all(|| WaitSignal::Undeployed);
            let free: Vec<_> = state.free.drain(..).collect();
            state.total = state.total.saturating_sub(free.len() as u32);
            (free, rejected)
        };
        self.shutdown.cancel();
        for idle in free {
            self.factory.destroy(idle.connection);
        }
        self.quiescence.notify_waiters();
        info!(
            pool = %self.identity,
            pool_id = %self.id,
            rejected,
            "[PhysicalPool] Closed"
        );
        rejected
    }

    /// Swap in a snapshot that differs only in attributes allowed to change live.
    ///
    /// A lower maximum destroys surplus free connections (leased surplus goes
    /// when returned); a higher one hands new slots to parked callers.
    pub fn reconfigure_in_place(self: &Arc<Self>, config: PoolConfiguration) -> usize {
        let surplus = {
            let mut state = self.state.lock();
            state.config = Arc::new(config);
            let over = state.total.saturating_sub(state.config.max_pool_size) as usize;
            let cut = over.min(state.free.len());
            let keep = state.free.len() - cut;
            let surplus: Vec<_> = state.free.drain(keep..).collect();
            state.total -= surplus.len() as u32;
            while self.offer_slot(&mut state) {}
            surplus
        };
        let destroyed = surplus.len();
        for idle in surplus {
            self.factory.destroy(idle.connection);
        }
        debug!(
            pool = %self.identity,
            destroyed,
            "[PhysicalPool] Configuration updated in place"
        );
        destroyed
    }

    /// Destroy every free connection; leased ones are unaffected.
    pub fn flush(&self) -> usize {
        let free: Vec<_> = {
            let mut state = self.state.lock();
            let free: Vec<_> = state.free.drain(..).collect();
            state.total = state.total.saturating_sub(free.len() as u32);
            free
        };
        let flushed = free.len();
        for idle in free {
            self.factory.destroy(idle.connection);
        }
        info!(pool = %self.identity, flushed, "[PhysicalPool] Flushed free connections");
        flushed
    }

    /// Wait up to `within` for the pool to become quiescent.
    pub async fn wait_quiescent(&self, within: Duration) -> bool {
        let notified = self.quiescence.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_quiescent() {
            return true;
        }
        let _ = tokio::time::timeout(within, notified).await;
        self.is_quiescent()
    }

    // =========================================================================
    // Resizer
    // =========================================================================

    /// One resizer pass: reap idle connections past the idle timeout (at most
    /// one resize quantum, never below steady), flag leases held past the leak
    /// timeout and top the pool back up to steady once it has been used.
    pub async fn resize_now(self: &Arc<Self>) -> ResizeReport {
        let now = Instant::now();
        let mut report = ResizeReport::default();

        let (expired, suspects, top_up) = {
            let mut state = self.state.lock();
            if state.phase != Phase::Active {
                report.skipped = true;
                return report;
            }
            let config = state.config.clone();
            let waiters = !state.admission.is_empty();

            let mut expired = Vec::new();
            if waiters {
                report.skipped = true;
            } else if !config.idle_timeout.is_zero() {
                let removable = state
                    .total
                    .saturating_sub(config.steady_pool_size)
                    .min(config.resize_quantity) as usize;
                let mut kept = VecDeque::with_capacity(state.free.len());
                while let Some(idle) = state.free.pop_back() {
                    if expired.len() < removable
                        && now.saturating_duration_since(idle.last_used) >= config.idle_timeout
                    {
                        expired.push(idle);
                    } else {
                        kept.push_front(idle);
                    }
                }
                state.free = kept;
                state.total -= expired.len() as u32;
            }

            let mut suspects = Vec::new();
            if !config.leak_timeout.is_zero() {
                for (id, lease) in state.leases.iter_mut() {
                    let held = now.saturating_duration_since(lease.since);
                    if !lease.reported && held >= config.leak_timeout {
                        lease.reported = true;
                        suspects.push((*id, held));
                    }
                }
                suspects.sort_by_key(|(id, _)| *id);
            }

            let top_up = if !waiters && state.steady_filled {
                let missing = config.steady_pool_size.saturating_sub(state.total);
                self.reserve_prefill(&mut state, missing)
            } else {
                Vec::new()
            };

            (expired, suspects, top_up)
        };

        report.destroyed_idle = expired.len();
        for idle in expired {
            debug!(
                pool = %self.identity,
                connection_id = idle.id,
                age_ms = now.saturating_duration_since(idle.created_at).as_millis() as u64,
                "[PhysicalPool] Reaping idle connection"
            );
            self.factory.destroy(idle.connection);
        }

        for (connection_id, held) in suspects {
            warn!(
                pool = %self.identity,
                connection_id,
                held_ms = held.as_millis() as u64,
                "[PhysicalPool] Connection held past leak timeout"
            );
            self.events.emit(PoolEvent::ConnectionLeakSuspected {
                identity: self.identity.clone(),
                connection_id,
                held_ms: held.as_millis() as u64,
            });
            report.leak_suspects.push(connection_id);
        }

        for slot in top_up {
            if self.fill_one(slot).await {
                report.created += 1;
            }
        }

        report
    }
}

impl Drop for PhysicalPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Take the payload back out of a signal nobody received.
fn defuse(signal: WaitSignal) -> Option<IdleConnection> {
    match signal {
        WaitSignal::Granted(lease) => lease.into_idle(),
        WaitSignal::Reserved(reservation) => {
            reservation.claim();
            None
        }
        WaitSignal::Retry | WaitSignal::Reconfigured | WaitSignal::Undeployed => None,
    }
}
