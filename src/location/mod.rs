use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::engine::dispatch::DispatchClient;
use crate::geo::{GeoPoint, haversine_m};
use crate::models::location::LocationSample;
use crate::observability::metrics::Metrics;
use crate::session::SessionManager;

/// Abstraction over the positioning capability. Real devices wrap a GPS
/// subscription; tests and the headless agent use synthetic sources.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Query (and if needed prompt for) permission. False means tracking
    /// must not start.
    async fn request_permission(&self) -> bool;

    /// One fix, or None when positioning is currently unavailable.
    async fn acquire(&self) -> Option<LocationSample>;
}

/// Synthetic source pinned to a fixed point; used by the agent binary.
pub struct StaticPositionSource {
    point: GeoPoint,
}

impl StaticPositionSource {
    pub fn new(point: GeoPoint) -> Self {
        Self { point }
    }
}

#[async_trait]
impl PositionSource for StaticPositionSource {
    async fn request_permission(&self) -> bool {
        true
    }

    async fn acquire(&self) -> Option<LocationSample> {
        Some(LocationSample {
            latitude: self.point.lat,
            longitude: self.point.lng,
            accuracy_m: 5.0,
            heading_deg: None,
            speed_mps: Some(0.0),
            captured_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    /// Short interval, tight movement threshold.
    Foreground,
    /// Long interval, coarse threshold.
    Background,
}

/// Periodic position sampler. Holds only the most recent sample; pushes a
/// fix upstream when the driver has moved past the mode's distance
/// threshold. Never starts without permission and stops on its own when the
/// session disappears.
pub struct LocationTracker {
    source: Arc<dyn PositionSource>,
    session: Arc<SessionManager>,
    dispatch: Arc<DispatchClient>,
    driver_id: Uuid,
    foreground_interval: Duration,
    background_interval: Duration,
    foreground_distance_m: f64,
    background_distance_m: f64,
    mode: watch::Sender<TrackingMode>,
    last: watch::Sender<Option<LocationSample>>,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<Metrics>,
}

impl LocationTracker {
    pub fn new(
        config: &Config,
        source: Arc<dyn PositionSource>,
        session: Arc<SessionManager>,
        dispatch: Arc<DispatchClient>,
        driver_id: Uuid,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        let (mode, _) = watch::channel(TrackingMode::Foreground);
        let (last, _) = watch::channel(None);

        Arc::new(Self {
            source,
            session,
            dispatch,
            driver_id,
            foreground_interval: config.foreground_sample_interval,
            background_interval: config.background_sample_interval,
            foreground_distance_m: config.foreground_distance_m,
            background_distance_m: config.background_distance_m,
            mode,
            last,
            running: AtomicBool::new(false),
            task: Mutex::new(None),
            metrics,
        })
    }

    /// Begin sampling. Degrades to `false` (no-op) when permission is
    /// denied or there is no authenticated session.
    pub async fn start(self: &Arc<Self>) -> bool {
        if self.running.load(Ordering::SeqCst) {
            return true;
        }
        if !self.session.is_authenticated().await {
            debug!("location tracking not started: no session");
            return false;
        }
        if !self.source.request_permission().await {
            debug!("location tracking not started: permission denied");
            return false;
        }

        self.running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(Self::run_loop(self.clone()));
        *self.task.lock().await = Some(handle);
        debug!(driver_id = %self.driver_id, "location tracking started");
        true
    }

    /// Effective immediately: the sampling task is aborted, a fix already
    /// in flight has no further effect.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        debug!(driver_id = %self.driver_id, "location tracking stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_mode(&self, mode: TrackingMode) {
        // send_replace: must take effect even with no receivers alive
        self.mode.send_replace(mode);
    }

    pub fn mode(&self) -> TrackingMode {
        *self.mode.borrow()
    }

    /// Most recent fix, if any. Nothing older is retained.
    pub fn sample(&self) -> Option<LocationSample> {
        self.last.borrow().clone()
    }

    fn cadence(&self, mode: TrackingMode) -> (Duration, f64) {
        match mode {
            TrackingMode::Foreground => (self.foreground_interval, self.foreground_distance_m),
            TrackingMode::Background => (self.background_interval, self.background_distance_m),
        }
    }

    async fn run_loop(tracker: Arc<Self>) {
        let mut last_pushed: Option<GeoPoint> = None;

        loop {
            let mode = *tracker.mode.borrow();
            let (interval, threshold) = tracker.cadence(mode);
            tokio::time::sleep(interval).await;

            if !tracker.running.load(Ordering::SeqCst) {
                return;
            }
            // Sampling stops entirely without an authenticated session.
            if !tracker.session.is_authenticated().await {
                warn!("session gone; location tracking stopped");
                tracker.running.store(false, Ordering::SeqCst);
                return;
            }

            let Some(sample) = tracker.source.acquire().await else {
                continue;
            };
            tracker.last.send_replace(Some(sample.clone()));

            let moved_enough = last_pushed
                .map(|previous| haversine_m(&previous, &sample.point()) >= threshold)
                .unwrap_or(true);
            if !moved_enough {
                continue;
            }

            match tracker
                .dispatch
                .push_location(tracker.driver_id, &sample)
                .await
            {
                Ok(()) => {
                    last_pushed = Some(sample.point());
                    tracker
                        .metrics
                        .location_pushes_total
                        .with_label_values(&["success"])
                        .inc();
                }
                Err(err) => {
                    warn!(error = %err, "location push failed");
                    tracker
                        .metrics
                        .location_pushes_total
                        .with_label_values(&["error"])
                        .inc();
                }
            }
        }
    }
}
