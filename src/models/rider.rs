use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RiderStatus {
    Pending,
    Available,
    InDelivery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rider {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub age: u8,
    pub region: String,
    /// Riders are matched to parcels whose sender service center equals
    /// their district.
    pub district: String,
    pub nid: String,
    pub bike_brand: String,
    pub bike_reg_no: String,
    pub status: RiderStatus,
    pub applied_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
