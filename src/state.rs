use std::sync::Arc;

use uuid::Uuid;

use crate::config::Config;
use crate::engine::cache::OrderQueryCache;
use crate::engine::dispatch::DispatchClient;
use crate::error::DispatchError;
use crate::location::{LocationTracker, PositionSource};
use crate::observability::metrics::Metrics;
use crate::session::{SessionManager, TokenStore};

/// Wires the core together for one driver. The session manager is the only
/// component allowed to touch the token pair; everything that speaks to the
/// backend goes through it.
pub struct DriverRuntime {
    pub config: Config,
    pub metrics: Arc<Metrics>,
    pub session: Arc<SessionManager>,
    pub dispatch: Arc<DispatchClient>,
    pub cache: Arc<OrderQueryCache>,
    pub tracker: Arc<LocationTracker>,
}

impl DriverRuntime {
    pub fn new(
        config: Config,
        driver_id: Uuid,
        district: Option<String>,
        store: Arc<dyn TokenStore>,
        source: Arc<dyn PositionSource>,
    ) -> Result<Self, DispatchError> {
        let metrics = Arc::new(Metrics::new());
        let session = Arc::new(SessionManager::new(&config, store, metrics.clone())?);
        let dispatch = Arc::new(DispatchClient::new(session.clone(), metrics.clone()));
        let cache = OrderQueryCache::new(
            dispatch.clone(),
            driver_id,
            district,
            config.list_poll_interval,
            config.detail_poll_interval,
            metrics.clone(),
        );
        let tracker = LocationTracker::new(
            &config,
            source,
            session.clone(),
            dispatch.clone(),
            driver_id,
            metrics.clone(),
        );

        Ok(Self {
            config,
            metrics,
            session,
            dispatch,
            cache,
            tracker,
        })
    }

    /// Offline and quiet: polling stopped, cache cleared, sampling stopped.
    pub async fn shutdown(&self) {
        self.cache.set_online(false).await;
        self.tracker.stop().await;
    }
}
