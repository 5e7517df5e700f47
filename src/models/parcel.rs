use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ParcelKind {
    Document,
    NonDocument,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStatus {
    Pending,
    RiderAssigned,
    InTransit,
    Delivered,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::RiderAssigned => "rider-assigned",
            DeliveryStatus::InTransit => "in-transit",
            DeliveryStatus::Delivered => "delivered",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
}

/// Snapshot of the rider set on a parcel by the assignment transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignedRider {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parcel {
    pub id: Uuid,
    pub tracking_code: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ParcelKind,
    pub weight_kg: Decimal,

    pub sender_name: String,
    pub sender_contact: String,
    pub sender_region: String,
    pub sender_service_center: String,
    pub sender_address: String,
    pub pickup_instruction: String,

    pub receiver_name: String,
    pub receiver_contact: String,
    pub receiver_region: String,
    pub receiver_service_center: String,
    pub receiver_address: String,
    pub delivery_instruction: String,

    /// Set exactly once at creation by the pricing engine.
    pub cost: Decimal,
    pub payment_status: PaymentStatus,
    pub delivery_status: DeliveryStatus,
    pub assigned_rider: Option<AssignedRider>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Parcel {
    /// Human-facing code shown in every parcel table, derived from the id.
    pub fn tracking_code_for(id: &Uuid) -> String {
        format!("PCL-{}", &id.simple().to_string()[..8].to_uppercase())
    }
}
