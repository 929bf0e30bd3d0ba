//! Order synchronization controller
//!
//! Owns the in-memory order collection and keeps it reconciled against
//! the order service: explicit loads, background refreshes, optimistic
//! mutations with snapshot rollback, and feed events all funnel into the
//! same collection through the same two entry points (`upsert`/`remove`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use shared::message::OrderEvent;
use shared::models::{Order, OrderDraft, OrderPatch, OrderStatus, OrderType};
use shared::util;

use crate::api::OrderApi;
use crate::{ClientConfig, ClientError, ClientResult};

/// Fetch lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    /// Blocking initial fetch; consumers show a loading state
    Loading,
    /// Background fetch; stale data stays visible
    Refreshing,
}

/// Point-in-time controller status, for status lines and dashboards
#[derive(Debug, Clone)]
pub struct SyncSnapshot {
    pub phase: SyncPhase,
    pub last_error: Option<String>,
    pub filter: Option<OrderStatus>,
    pub version: u64,
    pub order_count: usize,
}

/// Dashboard counts keyed by (channel, status), recomputed per call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusCounts {
    counts: HashMap<(OrderType, OrderStatus), usize>,
    total: usize,
}

impl StatusCounts {
    fn tally(orders: &[Order]) -> Self {
        let mut counts: HashMap<(OrderType, OrderStatus), usize> = HashMap::new();
        for order in orders {
            *counts.entry((order.order_type, order.status)).or_default() += 1;
        }
        Self {
            counts,
            total: orders.len(),
        }
    }

    /// Orders of this channel in this status.
    pub fn get(&self, order_type: OrderType, status: OrderStatus) -> usize {
        self.counts.get(&(order_type, status)).copied().unwrap_or(0)
    }

    /// Orders in this status, across channels.
    pub fn by_status(&self, status: OrderStatus) -> usize {
        OrderType::ALL.iter().map(|ty| self.get(*ty, status)).sum()
    }

    /// Orders of this channel, across statuses.
    pub fn by_type(&self, order_type: OrderType) -> usize {
        OrderStatus::ALL
            .iter()
            .map(|s| self.get(order_type, *s))
            .sum()
    }

    /// Orders in non-terminal statuses.
    pub fn active(&self) -> usize {
        OrderStatus::ALL
            .iter()
            .filter(|s| !s.is_terminal())
            .map(|s| self.by_status(*s))
            .sum()
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

struct SyncState {
    /// Authoritative collection, newest first
    orders: Vec<Order>,
    phase: SyncPhase,
    /// Sticky until the next successful fetch
    last_error: Option<String>,
    /// Server-side status filter for fetches
    filter: Option<OrderStatus>,
    /// Bumped per issued fetch; a fetch may only commit while it still
    /// holds the latest generation
    generation: u64,
}

struct SyncInner {
    api: Arc<dyn OrderApi>,
    state: RwLock<SyncState>,
    /// Change version, bumped on every visible state change
    changed: watch::Sender<u64>,
    /// Token of the fetch currently in flight; taken only while holding
    /// the state write lock, so supersession follows generation order
    inflight: Mutex<Option<CancellationToken>>,
    /// Running auto-refresh worker, if any
    worker: Mutex<Option<WorkerHandle>>,
    /// Pinged when the fetch filter changes, so the worker restarts its delay
    filter_changed: watch::Sender<()>,
    shutdown: CancellationToken,
    auto_refresh_interval: Duration,
}

struct WorkerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Order synchronization controller handle. Cheap to clone; all clones
/// share one collection.
///
/// Construction wires dependencies only. Nothing runs until `load` or
/// `start_auto_refresh` is called, and `shutdown` tears everything down.
#[derive(Clone)]
pub struct OrderSync {
    inner: Arc<SyncInner>,
}

impl std::fmt::Debug for OrderSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read().unwrap();
        f.debug_struct("OrderSync")
            .field("orders", &state.orders.len())
            .field("phase", &state.phase)
            .field("filter", &state.filter)
            .finish()
    }
}

impl OrderSync {
    /// Create a controller over the given API.
    pub fn new(api: Arc<dyn OrderApi>, config: &ClientConfig) -> Self {
        let (changed, _) = watch::channel(0);
        let (filter_changed, _) = watch::channel(());
        Self {
            inner: Arc::new(SyncInner {
                api,
                state: RwLock::new(SyncState {
                    orders: Vec::new(),
                    phase: SyncPhase::Idle,
                    last_error: None,
                    filter: None,
                    generation: 0,
                }),
                changed,
                inflight: Mutex::new(None),
                worker: Mutex::new(None),
                filter_changed,
                shutdown: CancellationToken::new(),
                auto_refresh_interval: config.auto_refresh_interval,
            }),
        }
    }

    // ========== Fetching ==========

    /// Fetch the collection under the given filter, superseding any fetch
    /// still in flight. The superseded fetch never commits.
    pub async fn load(&self, filter: Option<OrderStatus>) -> ClientResult<()> {
        let filter_changed = {
            let mut state = self.inner.state.write().unwrap();
            let changed = state.filter != filter;
            state.filter = filter;
            changed
        };
        if filter_changed {
            // Restart the auto-refresh delay from this explicit fetch
            let _ = self.inner.filter_changed.send(());
        }
        self.run_fetch(SyncPhase::Loading).await
    }

    /// Re-fetch under the current filter without hiding stale data.
    pub async fn refresh(&self) -> ClientResult<()> {
        self.run_fetch(SyncPhase::Refreshing).await
    }

    async fn run_fetch(&self, phase: SyncPhase) -> ClientResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let token = self.inner.shutdown.child_token();
        let (generation, filter) = {
            let mut state = self.inner.state.write().unwrap();
            state.generation += 1;
            state.phase = phase;
            // Supersede under the same lock as the generation bump, so the
            // fetch holding the newest generation can never be the one that
            // gets cancelled
            if let Some(prev) = self.inner.inflight.lock().unwrap().replace(token.clone()) {
                prev.cancel();
            }
            (state.generation, state.filter)
        };
        self.notify();

        let result = tokio::select! {
            result = self.inner.api.fetch_orders(filter) => result,
            _ = token.cancelled() => Err(ClientError::Cancelled),
        };

        match result {
            Ok(orders) => {
                {
                    let mut state = self.inner.state.write().unwrap();
                    // A newer fetch was issued while this one ran; its
                    // outcome owns the collection, not ours.
                    if state.generation != generation {
                        return Err(ClientError::Cancelled);
                    }
                    tracing::debug!(count = orders.len(), ?filter, "Order fetch committed");
                    state.orders = orders;
                    state.phase = SyncPhase::Idle;
                    state.last_error = None;
                }
                self.notify();
                Ok(())
            }
            Err(err) if err.is_cancelled() => {
                tracing::debug!("Order fetch superseded");
                Err(ClientError::Cancelled)
            }
            Err(err) => {
                {
                    let mut state = self.inner.state.write().unwrap();
                    if state.generation != generation {
                        return Err(ClientError::Cancelled);
                    }
                    // Keep the last-known-good collection visible
                    state.phase = SyncPhase::Idle;
                    state.last_error = Some(err.to_string());
                }
                self.notify();
                tracing::warn!(error = %err, "Order fetch failed; keeping previous collection");
                Err(err)
            }
        }
    }

    // ========== Mutations ==========

    /// Advance an order's status optimistically.
    ///
    /// Illegal transitions are rejected against the lifecycle table before
    /// anything is touched. On remote failure the pre-mutation order is
    /// restored exactly and the error is returned to the caller.
    pub async fn update_status(&self, id: i64, next: OrderStatus) -> ClientResult<Order> {
        let snapshot = {
            let state = self.inner.state.read().unwrap();
            let order = state
                .orders
                .iter()
                .find(|o| o.id == id)
                .ok_or_else(|| ClientError::NotFound(format!("order {id}")))?;
            if !order.status.can_transition_to(next) {
                return Err(ClientError::Transition {
                    from: order.status,
                    to: next,
                });
            }
            order.clone()
        };

        self.apply_optimistic(id, |order| {
            order.status = next;
            order.updated_at = util::now_millis();
        });

        match self.inner.api.update_status(id, next).await {
            Ok(updated) => {
                self.check_total(&updated);
                self.upsert(updated.clone());
                Ok(updated)
            }
            Err(err) => {
                self.rollback(id, snapshot);
                tracing::warn!(order_id = id, error = %err, "Status update rejected; rolled back");
                Err(err)
            }
        }
    }

    /// Merge a patch into an order optimistically.
    ///
    /// A status carried in the patch is validated like `update_status`.
    /// On remote failure the pre-mutation order is restored exactly and
    /// the error is returned to the caller.
    pub async fn update_order(&self, id: i64, patch: OrderPatch) -> ClientResult<Order> {
        let snapshot = {
            let state = self.inner.state.read().unwrap();
            let order = state
                .orders
                .iter()
                .find(|o| o.id == id)
                .ok_or_else(|| ClientError::NotFound(format!("order {id}")))?;
            if let Some(next) = patch.status {
                if !order.status.can_transition_to(next) {
                    return Err(ClientError::Transition {
                        from: order.status,
                        to: next,
                    });
                }
            }
            order.clone()
        };

        self.apply_optimistic(id, |order| patch.apply_to(order));

        match self.inner.api.update_order(id, patch).await {
            Ok(updated) => {
                self.check_total(&updated);
                self.upsert(updated.clone());
                Ok(updated)
            }
            Err(err) => {
                self.rollback(id, snapshot);
                tracing::warn!(order_id = id, error = %err, "Order update rejected; rolled back");
                Err(err)
            }
        }
    }

    /// Create an order. The service's result enters the collection through
    /// `upsert`, so the matching feed event is harmless.
    pub async fn create_order(&self, draft: OrderDraft) -> ClientResult<Order> {
        let order = self.inner.api.create_order(draft).await?;
        self.check_total(&order);
        self.upsert(order.clone());
        Ok(order)
    }

    fn apply_optimistic(&self, id: i64, mutate: impl FnOnce(&mut Order)) {
        {
            let mut state = self.inner.state.write().unwrap();
            if let Some(order) = state.orders.iter_mut().find(|o| o.id == id) {
                mutate(order);
            }
        }
        self.notify();
    }

    fn rollback(&self, id: i64, snapshot: Order) {
        {
            let mut state = self.inner.state.write().unwrap();
            if let Some(order) = state.orders.iter_mut().find(|o| o.id == id) {
                *order = snapshot;
            }
        }
        self.notify();
    }

    // ========== Collection entry points ==========

    /// Insert or replace a whole order. Known ids are replaced in place,
    /// keeping their position; unknown ids are prepended. Idempotent.
    pub fn upsert(&self, order: Order) {
        {
            let mut state = self.inner.state.write().unwrap();
            match state.orders.iter_mut().find(|o| o.id == order.id) {
                Some(existing) => *existing = order,
                None => state.orders.insert(0, order),
            }
        }
        self.notify();
    }

    /// Drop an order by id. Unknown ids are a no-op. Idempotent.
    pub fn remove(&self, id: i64) {
        let removed = {
            let mut state = self.inner.state.write().unwrap();
            let before = state.orders.len();
            state.orders.retain(|o| o.id != id);
            state.orders.len() != before
        };
        if removed {
            self.notify();
        }
    }

    /// Route a feed event into the collection.
    pub fn apply_event(&self, event: OrderEvent) {
        match event {
            OrderEvent::Created(order) | OrderEvent::Updated(order) => {
                self.check_total(&order);
                self.upsert(order);
            }
            OrderEvent::Removed(id) => self.remove(id),
        }
    }

    fn check_total(&self, order: &Order) {
        if order.total_diverges() {
            tracing::warn!(
                order_id = order.id,
                stored = order.total_amount,
                computed = order.computed_total(),
                "Stored total diverges from recomputed total"
            );
        }
    }

    // ========== Views ==========

    /// Snapshot of the full collection, newest first.
    pub fn orders(&self) -> Vec<Order> {
        self.inner.state.read().unwrap().orders.clone()
    }

    /// Orders still in flight (non-terminal statuses).
    pub fn active_orders(&self) -> Vec<Order> {
        self.inner
            .state
            .read()
            .unwrap()
            .orders
            .iter()
            .filter(|o| o.is_active())
            .cloned()
            .collect()
    }

    /// Orders of one channel.
    pub fn of_type(&self, order_type: OrderType) -> Vec<Order> {
        self.filtered(Some(order_type), None)
    }

    /// Orders in one status.
    pub fn with_status(&self, status: OrderStatus) -> Vec<Order> {
        self.filtered(None, Some(status))
    }

    /// Orders matching both optional criteria.
    pub fn filtered(&self, order_type: Option<OrderType>, status: Option<OrderStatus>) -> Vec<Order> {
        self.inner
            .state
            .read()
            .unwrap()
            .orders
            .iter()
            .filter(|o| order_type.is_none_or(|t| o.order_type == t))
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect()
    }

    /// One order by id.
    pub fn get(&self, id: i64) -> Option<Order> {
        self.inner
            .state
            .read()
            .unwrap()
            .orders
            .iter()
            .find(|o| o.id == id)
            .cloned()
    }

    /// Counts per (channel, status) for dashboard badges.
    pub fn status_counts(&self) -> StatusCounts {
        StatusCounts::tally(&self.inner.state.read().unwrap().orders)
    }

    /// Controller status for status lines.
    pub fn snapshot(&self) -> SyncSnapshot {
        let state = self.inner.state.read().unwrap();
        SyncSnapshot {
            phase: state.phase,
            last_error: state.last_error.clone(),
            filter: state.filter,
            version: *self.inner.changed.borrow(),
            order_count: state.orders.len(),
        }
    }

    /// Change feed: the receiver's value bumps on every visible change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changed.subscribe()
    }

    /// Current change version.
    pub fn version(&self) -> u64 {
        *self.inner.changed.borrow()
    }

    fn notify(&self) {
        self.inner.changed.send_modify(|v| *v += 1);
    }

    // ========== Auto refresh ==========

    /// Spawn the periodic refresh worker. Starting again replaces the
    /// previous worker.
    pub fn start_auto_refresh(&self) {
        let cancel = self.inner.shutdown.child_token();
        let worker = AutoRefresh {
            sync: self.clone(),
            interval: self.inner.auto_refresh_interval,
            filter_rx: self.inner.filter_changed.subscribe(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run());

        let mut guard = self.inner.worker.lock().unwrap();
        if let Some(prev) = guard.replace(WorkerHandle { cancel, task }) {
            prev.cancel.cancel();
        }
    }

    /// Stop the periodic refresh worker. Safe to call repeatedly.
    pub fn stop_auto_refresh(&self) {
        if let Some(worker) = self.inner.worker.lock().unwrap().take() {
            worker.cancel.cancel();
            tracing::debug!("Auto refresh stopped");
        }
    }

    /// Whether the refresh worker is currently installed.
    pub fn auto_refresh_running(&self) -> bool {
        self.inner
            .worker
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|w| !w.task.is_finished())
    }

    // ========== Teardown ==========

    /// Tear down deterministically: stop the worker, cancel any in-flight
    /// fetch and refuse further fetches. The collection stays readable.
    pub fn shutdown(&self) {
        tracing::info!("Order sync shutting down");
        self.inner.shutdown.cancel();
        self.stop_auto_refresh();
        let mut state = self.inner.state.write().unwrap();
        // Invalidate any fetch that already won its race
        state.generation += 1;
        state.phase = SyncPhase::Idle;
    }

    /// Whether `shutdown` has been called.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

/// Periodic refresh worker. A fresh delay starts on every loop pass, so a
/// filter change simply restarts the wait.
struct AutoRefresh {
    sync: OrderSync,
    interval: Duration,
    filter_rx: watch::Receiver<()>,
    cancel: CancellationToken,
}

impl AutoRefresh {
    async fn run(mut self) {
        tracing::debug!(interval = ?self.interval, "Auto refresh started");
        let mut consecutive_failures: u32 = 0;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    match self.sync.refresh().await {
                        Ok(()) => {
                            consecutive_failures = 0;
                        }
                        Err(err) if err.is_cancelled() => {}
                        Err(err) => {
                            consecutive_failures += 1;
                            tracing::warn!(
                                failures = consecutive_failures,
                                error = %err,
                                "Auto refresh failed"
                            );
                        }
                    }
                }
                result = self.filter_rx.changed() => {
                    if result.is_err() {
                        return;
                    }
                    tracing::debug!("Filter changed; refresh delay restarted");
                }
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Auto refresh worker stopped");
                    return;
                }
            }
        }
    }
}
