use std::sync::atomic::Ordering;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::models::parcel::AssignedRider;
use crate::models::tracking::{TrackingEvent, TrackingStatus};
use crate::state::AppState;

/// Append a milestone to a parcel's tracking history.
///
/// Every milestone is one-shot per parcel, so a retry of a compound
/// operation that already recorded its event gets the original event
/// back instead of a duplicate.
pub fn append(
    state: &AppState,
    parcel_id: Uuid,
    status: TrackingStatus,
    updated_by: &str,
    details: impl Into<String>,
    assigned_rider: Option<AssignedRider>,
) -> TrackingEvent {
    let mut events = state.trackings.entry(parcel_id).or_default();

    if let Some(existing) = events.iter().find(|event| event.status == status) {
        debug!(
            parcel_id = %parcel_id,
            status = status.as_str(),
            "duplicate tracking append suppressed"
        );
        return existing.clone();
    }

    let event = TrackingEvent {
        id: Uuid::new_v4(),
        parcel_id,
        status,
        updated_by: updated_by.to_string(),
        details: details.into(),
        assigned_rider,
        timestamp: Utc::now(),
        seq: state.event_seq.fetch_add(1, Ordering::Relaxed),
    };

    events.push(event.clone());
    drop(events);

    state.metrics.tracking_events_total.inc();
    let _ = state.tracking_events_tx.send(event.clone());

    event
}

/// Full history for a parcel, oldest first. Ordered by server-assigned
/// timestamp with the insertion sequence as tie-break, so concurrent
/// writers always reconstruct the same history.
pub fn history(state: &AppState, parcel_id: Uuid) -> Vec<TrackingEvent> {
    let mut events = state
        .trackings
        .get(&parcel_id)
        .map(|entry| entry.value().clone())
        .unwrap_or_default();

    events.sort_by_key(|event| (event.timestamp, event.seq));
    events
}

pub fn current(state: &AppState, parcel_id: Uuid) -> Option<TrackingEvent> {
    history(state, parcel_id).pop()
}

/// Drop a parcel's history alongside the parcel itself. Only legal for
/// parcels deleted before pickup.
pub fn remove(state: &AppState, parcel_id: Uuid) {
    state.trackings.remove(&parcel_id);
}
