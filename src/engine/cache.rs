use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::engine::dispatch::DispatchClient;
use crate::error::DispatchError;
use crate::models::order::Order;
use crate::observability::metrics::Metrics;

/// Point-in-time view of the orders visible to the driver, split into the
/// two disjoint subsets the driver UI works with. Recomputed wholesale from
/// every poll response; never patched in place.
#[derive(Debug, Clone, Default)]
pub struct OrderSnapshot {
    /// No preferred delivery time: deliver as soon as possible.
    pub immediate: Vec<Order>,
    /// Carries a preferred delivery time.
    pub scheduled: Vec<Order>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl OrderSnapshot {
    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.scheduled.is_empty()
    }

    pub fn contains(&self, order_id: Uuid) -> bool {
        self.immediate.iter().any(|order| order.id == order_id)
            || self.scheduled.iter().any(|order| order.id == order_id)
    }
}

/// Pure partition of a poll response into a snapshot.
pub fn partition(orders: Vec<Order>, fetched_at: Option<DateTime<Utc>>) -> OrderSnapshot {
    let (scheduled, immediate) = orders.into_iter().partition(Order::is_scheduled);
    OrderSnapshot {
        immediate,
        scheduled,
        fetched_at,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// This driver now owns the order.
    Assigned,
    /// Another driver got there first; the order was evicted locally.
    Lost,
}

/// Client-visible cache of "orders visible to this driver", refreshed by
/// interval polling while the driver is online. The backend is the sole
/// source of truth: each poll replaces the snapshot entirely, and going
/// offline clears it immediately rather than letting stale orders linger.
pub struct OrderQueryCache {
    dispatch: Arc<DispatchClient>,
    driver_id: Uuid,
    district: Option<String>,
    list_poll_interval: Duration,
    detail_poll_interval: Duration,
    snapshot_tx: watch::Sender<OrderSnapshot>,
    /// Bumped on every offline transition; a poll started under an older
    /// epoch discards its response instead of publishing it.
    epoch: AtomicU64,
    online: AtomicBool,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<Metrics>,
}

impl OrderQueryCache {
    pub fn new(
        dispatch: Arc<DispatchClient>,
        driver_id: Uuid,
        district: Option<String>,
        list_poll_interval: Duration,
        detail_poll_interval: Duration,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(OrderSnapshot::default());

        Arc::new(Self {
            dispatch,
            driver_id,
            district,
            list_poll_interval,
            detail_poll_interval,
            snapshot_tx,
            epoch: AtomicU64::new(0),
            online: AtomicBool::new(false),
            poll_task: Mutex::new(None),
            metrics,
        })
    }

    /// Toggle availability. Going online starts the poll loop; going
    /// offline stops it AND clears the snapshot at once — an empty list is
    /// correct while offline, a stale one is not.
    pub async fn set_online(self: &Arc<Self>, online: bool) {
        if online {
            if self.online.swap(true, Ordering::SeqCst) {
                return;
            }
            let epoch = self.epoch.load(Ordering::SeqCst);
            let handle = tokio::spawn(Self::poll_loop(self.clone(), epoch));
            *self.poll_task.lock().await = Some(handle);
            debug!(driver_id = %self.driver_id, "order polling started");
        } else {
            if !self.online.swap(false, Ordering::SeqCst) {
                return;
            }
            self.epoch.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = self.poll_task.lock().await.take() {
                handle.abort();
            }
            // send_replace publishes even when nobody subscribed via
            // updates(); plain send drops the value once the receiver
            // count is zero.
            self.snapshot_tx.send_replace(OrderSnapshot::default());
            debug!(driver_id = %self.driver_id, "order polling stopped, cache cleared");
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> OrderSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Snapshot changes as a stream; each item is a full replacement.
    pub fn updates(&self) -> WatchStream<OrderSnapshot> {
        WatchStream::new(self.snapshot_tx.subscribe())
    }

    /// Try to claim an order. A lost race is an expected outcome: the order
    /// is evicted from the snapshot and no error reaches the driver.
    pub async fn accept(&self, order_id: Uuid) -> Result<AcceptOutcome, DispatchError> {
        match self.dispatch.accept_order(order_id, self.driver_id).await {
            Ok(()) => Ok(AcceptOutcome::Assigned),
            Err(DispatchError::Conflict) => {
                self.evict(order_id);
                debug!(order_id = %order_id, "accept race lost; order evicted");
                Ok(AcceptOutcome::Lost)
            }
            Err(err) => Err(err),
        }
    }

    fn evict(&self, order_id: Uuid) {
        self.snapshot_tx.send_modify(|snapshot| {
            snapshot.immediate.retain(|order| order.id != order_id);
            snapshot.scheduled.retain(|order| order.id != order_id);
        });
    }

    /// Slower detail poll for a single in-progress order. The watch ends on
    /// its own once the order reaches a terminal stage; dropping the handle
    /// aborts it immediately.
    pub fn watch_order(&self, order_id: Uuid) -> OrderDetailWatch {
        let (tx, rx) = watch::channel(None::<Order>);
        let dispatch = self.dispatch.clone();
        let interval = self.detail_poll_interval;

        let task = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tick.tick().await;
                match dispatch.order_detail(order_id).await {
                    Ok(order) => {
                        let terminal = order.stage.is_terminal();
                        tx.send_replace(Some(order));
                        if terminal {
                            return;
                        }
                    }
                    Err(DispatchError::ExpiredSession) => return,
                    Err(err) => {
                        warn!(order_id = %order_id, error = %err, "detail poll failed");
                    }
                }
            }
        });

        OrderDetailWatch { rx, task }
    }

    async fn poll_loop(cache: Arc<Self>, epoch: u64) {
        let mut tick = tokio::time::interval(cache.list_poll_interval);

        loop {
            tick.tick().await;
            if cache.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }

            let started = Instant::now();
            let result = cache
                .dispatch
                .visible_orders(cache.driver_id, cache.district.as_deref())
                .await;
            let elapsed = started.elapsed().as_secs_f64();

            match result {
                Ok(orders) => {
                    // The driver may have gone offline while this request
                    // was in flight; a stale response is discarded, never
                    // merged.
                    if cache.epoch.load(Ordering::SeqCst) != epoch
                        || !cache.online.load(Ordering::SeqCst)
                    {
                        return;
                    }

                    let snapshot = partition(orders, Some(Utc::now()));
                    cache.snapshot_tx.send_replace(snapshot);

                    cache
                        .metrics
                        .polls_total
                        .with_label_values(&["success"])
                        .inc();
                    cache
                        .metrics
                        .poll_latency_seconds
                        .with_label_values(&["success"])
                        .observe(elapsed);
                }
                Err(DispatchError::ExpiredSession) => {
                    warn!("session expired; order polling stopped");
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "order poll failed");
                    cache
                        .metrics
                        .polls_total
                        .with_label_values(&["error"])
                        .inc();
                    cache
                        .metrics
                        .poll_latency_seconds
                        .with_label_values(&["error"])
                        .observe(elapsed);
                }
            }
        }
    }
}

pub struct OrderDetailWatch {
    rx: watch::Receiver<Option<Order>>,
    task: JoinHandle<()>,
}

impl OrderDetailWatch {
    pub fn current(&self) -> Option<Order> {
        self.rx.borrow().clone()
    }

    /// Wait for the next detail refresh. Returns false once the watch task
    /// has ended (terminal stage or lost session).
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl Drop for OrderDetailWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}
