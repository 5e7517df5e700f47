use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub parcels_created_total: IntCounter,
    pub status_transitions_total: IntCounterVec,
    pub tracking_events_total: IntCounter,
    pub payments_recorded_total: IntCounter,
    pub cashouts_total: IntCounterVec,
    pub deliveries_in_flight: IntGauge,
    pub inconsistencies_detected_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let parcels_created_total =
            IntCounter::new("parcels_created_total", "Total parcels booked")
                .expect("valid parcels_created_total metric");

        let status_transitions_total = IntCounterVec::new(
            Opts::new(
                "status_transitions_total",
                "Delivery status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid status_transitions_total metric");

        let tracking_events_total = IntCounter::new(
            "tracking_events_total",
            "Total tracking events appended to the ledger",
        )
        .expect("valid tracking_events_total metric");

        let payments_recorded_total = IntCounter::new(
            "payments_recorded_total",
            "Total gateway payments recorded",
        )
        .expect("valid payments_recorded_total metric");

        let cashouts_total = IntCounterVec::new(
            Opts::new("cashouts_total", "Cash-out requests by outcome"),
            &["outcome"],
        )
        .expect("valid cashouts_total metric");

        let deliveries_in_flight = IntGauge::new(
            "deliveries_in_flight",
            "Parcels currently assigned or in transit",
        )
        .expect("valid deliveries_in_flight metric");

        let inconsistencies_detected_total = IntCounter::new(
            "inconsistencies_detected_total",
            "Parcels whose status disagrees with their tracking history",
        )
        .expect("valid inconsistencies_detected_total metric");

        registry
            .register(Box::new(parcels_created_total.clone()))
            .expect("register parcels_created_total");
        registry
            .register(Box::new(status_transitions_total.clone()))
            .expect("register status_transitions_total");
        registry
            .register(Box::new(tracking_events_total.clone()))
            .expect("register tracking_events_total");
        registry
            .register(Box::new(payments_recorded_total.clone()))
            .expect("register payments_recorded_total");
        registry
            .register(Box::new(cashouts_total.clone()))
            .expect("register cashouts_total");
        registry
            .register(Box::new(deliveries_in_flight.clone()))
            .expect("register deliveries_in_flight");
        registry
            .register(Box::new(inconsistencies_detected_total.clone()))
            .expect("register inconsistencies_detected_total");

        Self {
            registry,
            parcels_created_total,
            status_transitions_total,
            tracking_events_total,
            payments_recorded_total,
            cashouts_total,
            deliveries_in_flight,
            inconsistencies_detected_total,
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
