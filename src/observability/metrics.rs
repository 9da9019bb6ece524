use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub offers_total: IntCounterVec,
    pub open_offers: IntGauge,
    pub claims_total: IntCounterVec,
    pub claim_latency_seconds: HistogramVec,
    pub notifications_total: IntCounterVec,
    pub worker_utilization: GaugeVec,
    pub invariant_violations_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let offers_total = IntCounterVec::new(
            Opts::new("offers_total", "Offer cycles by outcome"),
            &["outcome"],
        )
        .expect("valid offers_total metric");

        let open_offers = IntGauge::new("open_offers", "Assignments currently in the offered state")
            .expect("valid open_offers metric");

        let claims_total = IntCounterVec::new(
            Opts::new("claims_total", "Accept attempts by outcome"),
            &["outcome"],
        )
        .expect("valid claims_total metric");

        let claim_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "claim_latency_seconds",
                "Latency of accept processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid claim_latency_seconds metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Notification deliveries by outcome"),
            &["outcome"],
        )
        .expect("valid notifications_total metric");

        let worker_utilization = GaugeVec::new(
            Opts::new("worker_utilization", "Worker active assignments over capacity [0..1]"),
            &["worker_id"],
        )
        .expect("valid worker_utilization metric");

        let invariant_violations_total = IntCounter::new(
            "invariant_violations_total",
            "Orders observed with more than one claimed assignment",
        )
        .expect("valid invariant_violations_total metric");

        registry
            .register(Box::new(offers_total.clone()))
            .expect("register offers_total");
        registry
            .register(Box::new(open_offers.clone()))
            .expect("register open_offers");
        registry
            .register(Box::new(claims_total.clone()))
            .expect("register claims_total");
        registry
            .register(Box::new(claim_latency_seconds.clone()))
            .expect("register claim_latency_seconds");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(worker_utilization.clone()))
            .expect("register worker_utilization");
        registry
            .register(Box::new(invariant_violations_total.clone()))
            .expect("register invariant_violations_total");

        Self {
            registry,
            offers_total,
            open_offers,
            claims_total,
            claim_latency_seconds,
            notifications_total,
            worker_utilization,
            invariant_violations_total,
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
