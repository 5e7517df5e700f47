use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a gateway charge, recorded when a parcel is marked paid.
/// The transaction id is opaque; the gateway interaction itself happens
/// outside this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub parcel_id: Uuid,
    pub email: String,
    pub amount: Decimal,
    pub transaction_id: String,
    pub paid_at: DateTime<Utc>,
}
