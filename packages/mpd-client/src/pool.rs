//! Bounded pool of MPD connections
//!
//! Connections live in an indexed arena. Every slot carries the connection's
//! state tag (a `watch` receiver fed by the connection's reader task), so
//! checking liveness before reuse is a field read. Capacity is bounded by a
//! fair semaphore: a permit is held for as long as a caller owns a
//! connection, which makes waiters queue up FIFO once `max_size` connections
//! are in use.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};

use reveille_shared_config::MpdConfig;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, warn};

use crate::connection::{Connection, ConnectionState};
use crate::error::{ConnectionError, ConnectionResult};

/// Snapshot of the pool's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Live connections, idle or in use, plus those still connecting
    pub size: usize,
    /// Connections waiting in the idle set
    pub idle: usize,
    /// Connections handed out to callers
    pub in_use: usize,
    /// Connections whose handshake is in progress
    pub connecting: usize,
    /// Configured upper bound on `size`
    pub max_size: usize,
}

/// Pool of MPD connections. Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct MpdPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for MpdPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpdPool")
            .field("address", &self.inner.address)
            .field("status", &self.status())
            .finish()
    }
}

impl MpdPool {
    /// Create a pool. No connection is opened until the first `acquire`.
    ///
    /// Must be called from within a Tokio runtime: the idle sweeper is
    /// spawned here and stops when the last clone of the pool is dropped.
    pub fn new(config: MpdConfig) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<PoolInner>| {
            let period = config.reap_interval().max(Duration::from_millis(1));
            let reaper = tokio::spawn(reap_idle(weak.clone(), period));
            PoolInner {
                address: config.address(),
                permits: Arc::new(Semaphore::new(config.max_size)),
                state: Mutex::new(PoolState::default()),
                config,
                reaper,
            }
        });
        Self { inner }
    }

    /// Configuration the pool was created with
    pub fn config(&self) -> &MpdConfig {
        &self.inner.config
    }

    /// Get a ready connection.
    ///
    /// Reuses an idle connection when a live, fresh one exists; otherwise
    /// opens a new one if the pool is below `max_size`; otherwise waits
    /// for a release. A connection failure is returned as is, without retry.
    #[instrument(skip(self), fields(address = %self.inner.address))]
    pub async fn acquire(&self) -> ConnectionResult<PooledConnection> {
        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| ConnectionError::PoolClosed)?;

        let (checkout, evicted) = self
            .inner
            .lock()
            .checkout(self.inner.config.idle_recycle_interval());
        destroy_all(evicted);

        let index = match checkout {
            Checkout::Reused(index, connection) => {
                debug!(connection = connection.id(), "Reusing idle MPD connection");
                return Ok(PooledConnection::new(
                    Arc::clone(&self.inner),
                    index,
                    connection,
                    permit,
                ));
            }
            Checkout::Reserved(index) => index,
        };

        let reservation = Reservation {
            pool: Arc::clone(&self.inner),
            index: Some(index),
        };
        let connection = Connection::open(&self.inner.address).await.map_err(|e| {
            warn!(error = %e, "Failed to open MPD connection");
            e
        })?;
        reservation.fulfil(&connection);

        Ok(PooledConnection::new(
            Arc::clone(&self.inner),
            index,
            connection,
            permit,
        ))
    }

    /// Return a connection to the pool.
    ///
    /// Same as dropping the guard; a dead connection is discarded instead
    /// of becoming idle.
    pub fn release(&self, connection: PooledConnection) {
        drop(connection);
    }

    /// Current bookkeeping counters
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.lock();
        PoolStatus {
            size: state.size(),
            idle: state.idle.len(),
            in_use: state.count(|status| matches!(status, SlotStatus::InUse)),
            connecting: state.count(|status| matches!(status, SlotStatus::Connecting)),
            max_size: self.inner.config.max_size,
        }
    }

    /// Destroy idle connections that are dead or older than the recycle interval
    pub fn recycle_idle(&self) -> usize {
        self.inner.recycle_idle()
    }
}

/// A connection borrowed from the pool. Returned to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    index: usize,
    connection: Option<Connection>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    fn new(
        pool: Arc<PoolInner>,
        index: usize,
        connection: Connection,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            pool,
            index,
            connection: Some(connection),
            _permit: permit,
        }
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("slot", &self.index)
            .field("connection", &self.connection)
            .finish()
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match &self.connection {
            Some(connection) => connection,
            None => unreachable!("pooled connection is only taken on drop"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        match &mut self.connection {
            Some(connection) => connection,
            None => unreachable!("pooled connection is only taken on drop"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(self.index, connection);
        }
        // The permit is released after the connection is back in the idle set.
    }
}

struct PoolInner {
    config: MpdConfig,
    address: String,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState>,
    reaper: JoinHandle<()>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, index: usize, connection: Connection) {
        let discarded = {
            let mut state = self.lock();
            if connection.is_reusable() {
                state.make_idle(index, connection)
            } else {
                state.remove(index);
                Some(connection)
            }
        };

        if let Some(connection) = discarded {
            debug!(connection = connection.id(), "Discarding released MPD connection");
            connection.close();
        }
    }

    fn recycle_idle(&self) -> usize {
        let evicted = self
            .lock()
            .evict_idle(self.config.idle_recycle_interval());
        let count = evicted.len();
        if count > 0 {
            debug!(count, "Recycled idle MPD connections");
        }
        destroy_all(evicted);
        count
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        self.reaper.abort();
    }
}

enum SlotStatus {
    /// Handshake in progress; no connection object exists yet
    Connecting,
    Idle {
        connection: Connection,
        since: Instant,
    },
    InUse,
}

struct Slot {
    state: Option<watch::Receiver<ConnectionState>>,
    status: SlotStatus,
}

impl Slot {
    fn state(&self) -> ConnectionState {
        match &self.state {
            Some(state) => *state.borrow(),
            None => ConnectionState::Connecting,
        }
    }

    fn is_stale(&self, max_idle: Duration) -> bool {
        match &self.status {
            SlotStatus::Idle { since, .. } => since.elapsed() > max_idle,
            _ => false,
        }
    }

    fn into_connection(self) -> Option<Connection> {
        match self.status {
            SlotStatus::Idle { connection, .. } => Some(connection),
            _ => None,
        }
    }
}

enum Checkout {
    Reused(usize, Connection),
    Reserved(usize),
}

#[derive(Default)]
struct PoolState {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    idle: VecDeque<usize>,
}

impl PoolState {
    fn size(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    fn count(&self, predicate: impl Fn(&SlotStatus) -> bool) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| predicate(&slot.status))
            .count()
    }

    fn insert(&mut self, slot: Slot) -> usize {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                index
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }

    fn remove(&mut self, index: usize) -> Option<Slot> {
        let slot = self.slots.get_mut(index)?.take()?;
        self.free.push(index);
        Some(slot)
    }

    /// Hand out the oldest usable idle connection, or reserve a slot for a
    /// new one. Dead and stale idle connections met on the way are evicted.
    fn checkout(&mut self, max_idle: Duration) -> (Checkout, Vec<Connection>) {
        let mut evicted = Vec::new();

        while let Some(index) = self.idle.pop_front() {
            let usable = match self.slots.get(index).and_then(Option::as_ref) {
                Some(slot) => slot.state() == ConnectionState::Ready && !slot.is_stale(max_idle),
                None => continue,
            };

            if !usable {
                if let Some(connection) = self.remove(index).and_then(Slot::into_connection) {
                    evicted.push(connection);
                }
                continue;
            }

            if let Some(slot) = self.slots[index].as_mut() {
                let status = std::mem::replace(&mut slot.status, SlotStatus::InUse);
                if let SlotStatus::Idle { connection, .. } = status {
                    return (Checkout::Reused(index, connection), evicted);
                }
                slot.status = status;
            }
        }

        let index = self.insert(Slot {
            state: None,
            status: SlotStatus::Connecting,
        });
        (Checkout::Reserved(index), evicted)
    }

    /// Put a released connection back; hands it back if its slot is gone.
    fn make_idle(&mut self, index: usize, connection: Connection) -> Option<Connection> {
        match self.slots.get_mut(index).and_then(Option::as_mut) {
            Some(slot) => {
                slot.status = SlotStatus::Idle {
                    connection,
                    since: Instant::now(),
                };
            }
            None => return Some(connection),
        }
        self.idle.push_back(index);
        None
    }

    fn evict_idle(&mut self, max_idle: Duration) -> Vec<Connection> {
        let (keep, stale): (Vec<usize>, Vec<usize>) =
            self.idle.iter().copied().partition(|&index| {
                self.slots
                    .get(index)
                    .and_then(Option::as_ref)
                    .map(|slot| slot.state() == ConnectionState::Ready && !slot.is_stale(max_idle))
                    .unwrap_or(false)
            });
        self.idle = keep.into();

        stale
            .into_iter()
            .filter_map(|index| self.remove(index).and_then(Slot::into_connection))
            .collect()
    }
}

/// Slot reserved for a connection being opened; freed if the open fails or
/// the acquiring future is dropped.
struct Reservation {
    pool: Arc<PoolInner>,
    index: Option<usize>,
}

impl Reservation {
    fn fulfil(mut self, connection: &Connection) {
        if let Some(index) = self.index.take() {
            let mut state = self.pool.lock();
            if let Some(slot) = state.slots.get_mut(index).and_then(Option::as_mut) {
                slot.state = Some(connection.subscribe_state());
                slot.status = SlotStatus::InUse;
            }
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let Some(index) = self.index.take() {
            self.pool.lock().remove(index);
        }
    }
}

fn destroy_all(connections: Vec<Connection>) {
    for connection in connections {
        connection.close();
    }
}

async fn reap_idle(pool: Weak<PoolInner>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(pool) = pool.upgrade() else {
            break;
        };
        pool.recycle_idle();
    }
}
