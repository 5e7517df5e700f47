use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::{Actor, Role, RoleGate};
use crate::config::EarningsPolicy;
use crate::error::AppError;
use crate::models::cashout::CashoutRecord;
use crate::models::parcel::{DeliveryStatus, Parcel};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct CashoutRequest {
    #[serde(default)]
    pub parcel_id: Option<Uuid>,
    pub amount: Decimal,
}

/// Rider earnings dashboard figures, derived on every read.
#[derive(Debug, Clone, Serialize)]
pub struct EarningsSummary {
    pub total_earnings: Decimal,
    pub pending_earnings: Decimal,
    pub total_cashed_out: Decimal,
    pub month_earnings: Decimal,
    pub year_earnings: Decimal,
}

/// What a rider earns for one delivered parcel: the parcel cost times
/// the region rate (same-region legs pay less than cross-region ones).
pub fn parcel_earning(parcel: &Parcel, policy: &EarningsPolicy) -> Decimal {
    let rate = if parcel.sender_region == parcel.receiver_region {
        policy.same_region_rate
    } else {
        policy.cross_region_rate
    };

    parcel.cost * rate
}

/// Earning still payable for one parcel after the cash-outs recorded
/// against it. Never negative.
pub fn remaining_payable(
    parcel: &Parcel,
    cashouts: &[CashoutRecord],
    policy: &EarningsPolicy,
) -> Decimal {
    let cashed: Decimal = cashouts
        .iter()
        .filter(|record| record.parcel_id == Some(parcel.id))
        .map(|record| record.amount)
        .sum();

    (parcel_earning(parcel, policy) - cashed).max(Decimal::ZERO)
}

fn delivered_parcels_of(state: &AppState, rider_email: &str) -> Vec<Parcel> {
    state
        .parcels
        .iter()
        .filter(|entry| {
            let parcel = entry.value();
            parcel.delivery_status == DeliveryStatus::Delivered
                && parcel
                    .assigned_rider
                    .as_ref()
                    .is_some_and(|rider| rider.email == rider_email)
        })
        .map(|entry| entry.value().clone())
        .collect()
}

pub fn cashouts_of(state: &AppState, rider_email: &str) -> Vec<CashoutRecord> {
    let mut records: Vec<CashoutRecord> = state
        .cashouts
        .iter()
        .filter(|entry| entry.value().rider_email == rider_email)
        .map(|entry| entry.value().clone())
        .collect();

    records.sort_by_key(|record| std::cmp::Reverse(record.date));
    records
}

/// The rider's whole payable pool: earnings of every delivered parcel
/// minus every cash-out, bulk or per-parcel. Both cash-out paths draw
/// from this one number, so the two can never overdraw together.
pub fn pool_remaining(state: &AppState, rider_email: &str) -> Decimal {
    let earned: Decimal = delivered_parcels_of(state, rider_email)
        .iter()
        .map(|parcel| parcel_earning(parcel, &state.earnings))
        .sum();

    let cashed: Decimal = cashouts_of(state, rider_email)
        .iter()
        .map(|record| record.amount)
        .sum();

    (earned - cashed).max(Decimal::ZERO)
}

/// Validate and record a cash-out. Validation and insert run under one
/// lock so racing requests see each other's deductions.
pub fn request_cashout(
    state: &AppState,
    actor: &Actor,
    req: CashoutRequest,
) -> Result<CashoutRecord, AppError> {
    RoleGate::require(actor, &[Role::Rider])?;

    let reject = |message: String| {
        state
            .metrics
            .cashouts_total
            .with_label_values(&["rejected"])
            .inc();
        Err(AppError::Limit(message))
    };

    if req.amount < state.earnings.cashout_minimum {
        return reject(format!(
            "minimum cash-out amount is {}",
            state.earnings.cashout_minimum
        ));
    }

    let _guard = state
        .cashout_lock
        .lock()
        .map_err(|_| AppError::Internal("cashout lock poisoned".to_string()))?;

    let pool = pool_remaining(state, &actor.email);

    if let Some(parcel_id) = req.parcel_id {
        let parcel = state
            .parcels
            .get(&parcel_id)
            .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))?;

        if parcel
            .assigned_rider
            .as_ref()
            .is_none_or(|rider| rider.email != actor.email)
        {
            return Err(AppError::Forbidden(
                "parcel was not delivered by this rider".to_string(),
            ));
        }

        if parcel.delivery_status != DeliveryStatus::Delivered {
            return Err(AppError::StateConflict(
                "parcel is not delivered yet".to_string(),
            ));
        }

        let per_parcel = remaining_payable(&parcel, &cashouts_of(state, &actor.email), &state.earnings);
        // A bulk draw may already have consumed part of the pool, so the
        // parcel's own remainder is capped by what the pool still holds.
        let available = per_parcel.min(pool);

        if req.amount > available {
            return reject(format!(
                "requested {} exceeds remaining payable {} for this parcel",
                req.amount, available
            ));
        }
    } else if req.amount > pool {
        return reject(format!(
            "requested {} exceeds remaining earnings {}",
            req.amount, pool
        ));
    }

    let record = CashoutRecord {
        id: Uuid::new_v4(),
        rider_email: actor.email.clone(),
        parcel_id: req.parcel_id,
        amount: req.amount,
        date: Utc::now(),
    };

    state.cashouts.insert(record.id, record.clone());
    state
        .metrics
        .cashouts_total
        .with_label_values(&["accepted"])
        .inc();

    info!(
        rider = %record.rider_email,
        amount = %record.amount,
        bulk = record.parcel_id.is_none(),
        "cash-out recorded"
    );

    Ok(record)
}

pub fn summary(state: &AppState, rider_email: &str, now: DateTime<Utc>) -> EarningsSummary {
    let delivered = delivered_parcels_of(state, rider_email);

    let total_earnings: Decimal = delivered
        .iter()
        .map(|parcel| parcel_earning(parcel, &state.earnings))
        .sum();

    let total_cashed_out: Decimal = cashouts_of(state, rider_email)
        .iter()
        .map(|record| record.amount)
        .sum();

    let month_earnings: Decimal = delivered
        .iter()
        .filter(|parcel| {
            parcel.updated_at.year() == now.year() && parcel.updated_at.month() == now.month()
        })
        .map(|parcel| parcel_earning(parcel, &state.earnings))
        .sum();

    let year_earnings: Decimal = delivered
        .iter()
        .filter(|parcel| parcel.updated_at.year() == now.year())
        .map(|parcel| parcel_earning(parcel, &state.earnings))
        .sum();

    EarningsSummary {
        total_earnings,
        pending_earnings: (total_earnings - total_cashed_out).max(Decimal::ZERO),
        total_cashed_out,
        month_earnings,
        year_earnings,
    }
}
