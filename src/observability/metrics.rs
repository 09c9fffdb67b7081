use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub transition_latency_seconds: HistogramVec,
    pub matching_outcomes_total: IntCounterVec,
    pub notifications_total: IntCounterVec,
    pub connections_active: IntGauge,
    pub drivers_reaped_total: IntCounter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Order status transitions by outcome"),
            &["status", "outcome"],
        )
        .expect("valid order_transitions_total metric");

        let transition_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "order_transition_latency_seconds",
                "Latency of a transition including side effects, in seconds",
            ),
            &["outcome"],
        )
        .expect("valid order_transition_latency_seconds metric");

        let matching_outcomes_total = IntCounterVec::new(
            Opts::new("matching_outcomes_total", "Driver matching attempts by outcome"),
            &["outcome"],
        )
        .expect("valid matching_outcomes_total metric");

        let notifications_total = IntCounterVec::new(
            Opts::new("notifications_total", "Published notifications by outcome"),
            &["event", "outcome"],
        )
        .expect("valid notifications_total metric");

        let connections_active =
            IntGauge::new("connections_active", "Currently open client connections")
                .expect("valid connections_active metric");

        let drivers_reaped_total = IntCounter::new(
            "drivers_reaped_total",
            "Drivers demoted to offline after inactivity",
        )
        .expect("valid drivers_reaped_total metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(transition_latency_seconds.clone()))
            .expect("register order_transition_latency_seconds");
        registry
            .register(Box::new(matching_outcomes_total.clone()))
            .expect("register matching_outcomes_total");
        registry
            .register(Box::new(notifications_total.clone()))
            .expect("register notifications_total");
        registry
            .register(Box::new(connections_active.clone()))
            .expect("register connections_active");
        registry
            .register(Box::new(drivers_reaped_total.clone()))
            .expect("register drivers_reaped_total");

        Self {
            registry,
            transitions_total,
            transition_latency_seconds,
            matching_outcomes_total,
            notifications_total,
            connections_active,
            drivers_reaped_total,
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
