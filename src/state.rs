use std::sync::atomic::AtomicU64;
use std::sync::Mutex;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::EarningsPolicy;
use crate::models::cashout::CashoutRecord;
use crate::models::parcel::Parcel;
use crate::models::payment::PaymentRecord;
use crate::models::rider::Rider;
use crate::models::tracking::TrackingEvent;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub parcels: DashMap<Uuid, Parcel>,
    pub riders: DashMap<Uuid, Rider>,
    /// Append-only tracking ledger, one event list per parcel.
    pub trackings: DashMap<Uuid, Vec<TrackingEvent>>,
    pub payments: DashMap<Uuid, PaymentRecord>,
    pub cashouts: DashMap<Uuid, CashoutRecord>,
    /// Serializes cash-out validate-then-insert so two racing requests
    /// cannot both pass the balance check.
    pub cashout_lock: Mutex<()>,
    /// Monotonic insertion sequence for tracking events; tie-break when
    /// two events share a timestamp.
    pub event_seq: AtomicU64,
    pub tracking_events_tx: broadcast::Sender<TrackingEvent>,
    pub metrics: Metrics,
    pub earnings: EarningsPolicy,
}

impl AppState {
    pub fn new(event_buffer_size: usize, earnings: EarningsPolicy) -> Self {
        let (tracking_events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            parcels: DashMap::new(),
            riders: DashMap::new(),
            trackings: DashMap::new(),
            payments: DashMap::new(),
            cashouts: DashMap::new(),
            cashout_lock: Mutex::new(()),
            event_seq: AtomicU64::new(0),
            tracking_events_tx,
            metrics: Metrics::new(),
            earnings,
        }
    }
}
