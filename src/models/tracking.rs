use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::parcel::AssignedRider;

/// Milestones recorded in the tracking ledger. A superset of the
/// delivery states: the `paid` milestone belongs to the payment axis.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Submitted,
    Paid,
    RiderAssigned,
    #[serde(rename = "in-transit")]
    InTransit,
    Delivered,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingStatus::Submitted => "submitted",
            TrackingStatus::Paid => "paid",
            TrackingStatus::RiderAssigned => "rider_assigned",
            TrackingStatus::InTransit => "in-transit",
            TrackingStatus::Delivered => "delivered",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub id: Uuid,
    pub parcel_id: Uuid,
    pub status: TrackingStatus,
    pub updated_by: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_rider: Option<AssignedRider>,
    pub timestamp: DateTime<Utc>,
    /// Insertion sequence; tie-break when timestamps collide.
    pub seq: u64,
}
