use prometheus::{Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub token_refreshes_total: IntCounterVec,
    pub polls_total: IntCounterVec,
    pub poll_latency_seconds: HistogramVec,
    pub accepts_total: IntCounterVec,
    pub stage_updates_total: IntCounterVec,
    pub location_pushes_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let token_refreshes_total = IntCounterVec::new(
            Opts::new("token_refreshes_total", "Token refresh attempts by outcome"),
            &["outcome"],
        )
        .expect("valid token_refreshes_total metric");

        let polls_total = IntCounterVec::new(
            Opts::new("polls_total", "Visible-order polls by outcome"),
            &["outcome"],
        )
        .expect("valid polls_total metric");

        let poll_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "poll_latency_seconds",
                "Latency of visible-order polls in seconds",
            ),
            &["outcome"],
        )
        .expect("valid poll_latency_seconds metric");

        let accepts_total = IntCounterVec::new(
            Opts::new("accepts_total", "Accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid accepts_total metric");

        let stage_updates_total = IntCounterVec::new(
            Opts::new("stage_updates_total", "Stage writes by outcome"),
            &["outcome"],
        )
        .expect("valid stage_updates_total metric");

        let location_pushes_total = IntCounterVec::new(
            Opts::new("location_pushes_total", "Location updates pushed by outcome"),
            &["outcome"],
        )
        .expect("valid location_pushes_total metric");

        registry
            .register(Box::new(token_refreshes_total.clone()))
            .expect("register token_refreshes_total");
        registry
            .register(Box::new(polls_total.clone()))
            .expect("register polls_total");
        registry
            .register(Box::new(poll_latency_seconds.clone()))
            .expect("register poll_latency_seconds");
        registry
            .register(Box::new(accepts_total.clone()))
            .expect("register accepts_total");
        registry
            .register(Box::new(stage_updates_total.clone()))
            .expect("register stage_updates_total");
        registry
            .register(Box::new(location_pushes_total.clone()))
            .expect("register location_pushes_total");

        Self {
            registry,
            token_refreshes_total,
            polls_total,
            poll_latency_seconds,
            accepts_total,
            stage_updates_total,
            location_pushes_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
