use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One withdrawal against a rider's delivered-parcel earnings. The list
/// of these records is the canonical ledger: remaining balances are
/// always derived by subtraction at read time, never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CashoutRecord {
    pub id: Uuid,
    pub rider_email: String,
    /// None means a bulk draw against the rider's whole earnings pool.
    pub parcel_id: Option<Uuid>,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
}
