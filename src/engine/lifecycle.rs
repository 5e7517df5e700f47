use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{Actor, Role, RoleGate};
use crate::engine::{ledger, pricing};
use crate::error::AppError;
use crate::models::parcel::{
    AssignedRider, DeliveryStatus, Parcel, ParcelKind, PaymentStatus,
};
use crate::models::payment::PaymentRecord;
use crate::models::rider::RiderStatus;
use crate::models::tracking::TrackingStatus;
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct NewParcel {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ParcelKind,
    #[serde(default)]
    pub weight_kg: Option<Decimal>,

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
}

/// Gateway outcome that triggers marking a parcel paid.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentIntake {
    pub amount: Decimal,
    pub transaction_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InconsistencyReport {
    pub parcel_id: Uuid,
    pub parcel_status: DeliveryStatus,
    pub ledger_status: Option<DeliveryStatus>,
}

fn require_field(name: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} is required")));
    }
    Ok(())
}

/// Book a parcel: validate, price exactly once, store it pending/unpaid
/// and open its tracking history with a `submitted` event.
pub fn create(state: &AppState, actor: &Actor, req: NewParcel) -> Result<Parcel, AppError> {
    RoleGate::require(actor, &[Role::User, Role::Admin])?;

    for (name, value) in [
        ("title", &req.title),
        ("sender_name", &req.sender_name),
        ("sender_contact", &req.sender_contact),
        ("sender_region", &req.sender_region),
        ("sender_service_center", &req.sender_service_center),
        ("sender_address", &req.sender_address),
        ("pickup_instruction", &req.pickup_instruction),
        ("receiver_name", &req.receiver_name),
        ("receiver_contact", &req.receiver_contact),
        ("receiver_region", &req.receiver_region),
        ("receiver_service_center", &req.receiver_service_center),
        ("receiver_address", &req.receiver_address),
        ("delivery_instruction", &req.delivery_instruction),
    ] {
        require_field(name, value)?;
    }

    let weight_kg = req.weight_kg.unwrap_or(Decimal::ZERO);
    if weight_kg < Decimal::ZERO {
        return Err(AppError::Validation("weight_kg must not be negative".to_string()));
    }

    // Documents are priced weight-free; do not carry a meaningless weight.
    let weight_kg = match req.kind {
        ParcelKind::Document => Decimal::ZERO,
        ParcelKind::NonDocument => weight_kg,
    };

    let breakdown = pricing::quote(
        req.kind,
        weight_kg,
        &req.sender_service_center,
        &req.receiver_service_center,
    );

    let id = Uuid::new_v4();
    let now = Utc::now();
    let parcel = Parcel {
        id,
        tracking_code: Parcel::tracking_code_for(&id),
        title: req.title,
        kind: req.kind,
        weight_kg,
        sender_name: req.sender_name,
        sender_contact: req.sender_contact,
        sender_region: req.sender_region,
        sender_service_center: req.sender_service_center,
        sender_address: req.sender_address,
        pickup_instruction: req.pickup_instruction,
        receiver_name: req.receiver_name,
        receiver_contact: req.receiver_contact,
        receiver_region: req.receiver_region,
        receiver_service_center: req.receiver_service_center,
        receiver_address: req.receiver_address,
        delivery_instruction: req.delivery_instruction,
        cost: breakdown.total,
        payment_status: PaymentStatus::Unpaid,
        delivery_status: DeliveryStatus::Pending,
        assigned_rider: None,
        created_by: actor.email.clone(),
        created_at: now,
        updated_at: now,
    };

    state.parcels.insert(parcel.id, parcel.clone());
    state.metrics.parcels_created_total.inc();

    ledger::append(
        state,
        parcel.id,
        TrackingStatus::Submitted,
        &actor.email,
        format!("Parcel booked, delivery cost {}", parcel.cost),
        None,
    );

    info!(
        parcel_id = %parcel.id,
        tracking_code = %parcel.tracking_code,
        cost = %parcel.cost,
        "parcel created"
    );

    Ok(parcel)
}

/// Record a successful gateway charge and flip the payment axis to paid.
/// Delivery status is untouched.
pub fn record_payment(
    state: &AppState,
    actor: &Actor,
    parcel_id: Uuid,
    intake: PaymentIntake,
) -> Result<PaymentRecord, AppError> {
    RoleGate::require(actor, &[Role::User, Role::Admin])?;
    require_field("transaction_id", &intake.transaction_id)?;

    let record = {
        let mut parcel = state
            .parcels
            .get_mut(&parcel_id)
            .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))?;

        if parcel.created_by != actor.email && !actor.is_admin() {
            return Err(AppError::Forbidden("only the parcel owner may pay for it".to_string()));
        }

        if intake.amount != parcel.cost {
            return Err(AppError::Validation(format!(
                "payment amount {} does not match parcel cost {}",
                intake.amount, parcel.cost
            )));
        }

        if parcel.payment_status == PaymentStatus::Paid {
            return Err(AppError::StateConflict("parcel is already paid".to_string()));
        }

        parcel.payment_status = PaymentStatus::Paid;
        parcel.updated_at = Utc::now();

        PaymentRecord {
            id: Uuid::new_v4(),
            parcel_id,
            email: parcel.created_by.clone(),
            amount: intake.amount,
            transaction_id: intake.transaction_id.clone(),
            paid_at: parcel.updated_at,
        }
    };

    state.payments.insert(record.id, record.clone());
    state.metrics.payments_recorded_total.inc();

    ledger::append(
        state,
        parcel_id,
        TrackingStatus::Paid,
        &actor.email,
        format!(
            "Payment of {} confirmed, transaction {}",
            record.amount, record.transaction_id
        ),
        None,
    );

    info!(parcel_id = %parcel_id, transaction_id = %record.transaction_id, "payment recorded");

    Ok(record)
}

/// Assign an available rider to a paid, still-pending parcel.
///
/// The precondition check and both mutations happen under the parcel's
/// entry lock (then the rider's), so of two racing assignment attempts
/// exactly one commits; the loser sees the parcel already moved on and
/// gets a stale-state error.
pub fn assign_rider(
    state: &AppState,
    actor: &Actor,
    parcel_id: Uuid,
    rider_id: Uuid,
) -> Result<Parcel, AppError> {
    RoleGate::require(actor, &[Role::Admin])?;

    let (updated, rider_snapshot) = {
        let mut parcel = state
            .parcels
            .get_mut(&parcel_id)
            .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))?;

        if parcel.delivery_status != DeliveryStatus::Pending {
            return Err(AppError::StateConflict(format!(
                "parcel is no longer assignable (currently {})",
                parcel.delivery_status.as_str()
            )));
        }

        if parcel.payment_status != PaymentStatus::Paid {
            return Err(AppError::StateConflict(
                "parcel must be paid before a rider is assigned".to_string(),
            ));
        }

        // Lock order is always parcel then rider.
        let mut rider = state
            .riders
            .get_mut(&rider_id)
            .ok_or_else(|| AppError::NotFound(format!("rider {rider_id} not found")))?;

        if rider.status != RiderStatus::Available {
            return Err(AppError::StateConflict(format!(
                "rider {} is not available",
                rider.email
            )));
        }

        if !pricing::is_same_district(&rider.district, &parcel.sender_service_center) {
            return Err(AppError::Validation(format!(
                "rider district {} does not cover sender service center {}",
                rider.district, parcel.sender_service_center
            )));
        }

        rider.status = RiderStatus::InDelivery;
        rider.updated_at = Utc::now();

        let snapshot = AssignedRider {
            name: rider.name.clone(),
            email: rider.email.clone(),
        };

        parcel.assigned_rider = Some(snapshot.clone());
        parcel.delivery_status = DeliveryStatus::RiderAssigned;
        parcel.updated_at = Utc::now();

        (parcel.clone(), snapshot)
    };

    state
        .metrics
        .status_transitions_total
        .with_label_values(&[DeliveryStatus::RiderAssigned.as_str()])
        .inc();
    state.metrics.deliveries_in_flight.inc();

    ledger::append(
        state,
        parcel_id,
        TrackingStatus::RiderAssigned,
        &actor.email,
        format!("Parcel assigned to {}", rider_snapshot.name),
        Some(rider_snapshot.clone()),
    );

    info!(
        parcel_id = %parcel_id,
        rider = %rider_snapshot.email,
        "rider assigned"
    );

    Ok(updated)
}

/// Advance delivery one step: rider-assigned to in-transit, or
/// in-transit to delivered. Every other source state is a conflict.
pub fn advance(state: &AppState, actor: &Actor, parcel_id: Uuid) -> Result<Parcel, AppError> {
    RoleGate::require(actor, &[Role::Rider])?;

    let (updated, next, rider_email) = {
        let mut parcel = state
            .parcels
            .get_mut(&parcel_id)
            .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))?;

        let next = match parcel.delivery_status {
            DeliveryStatus::RiderAssigned => DeliveryStatus::InTransit,
            DeliveryStatus::InTransit => DeliveryStatus::Delivered,
            other => {
                return Err(AppError::StateConflict(format!(
                    "cannot advance delivery from {}",
                    other.as_str()
                )));
            }
        };

        let assigned = parcel.assigned_rider.clone().ok_or_else(|| {
            AppError::Inconsistent(format!(
                "parcel {parcel_id} is {} but has no assigned rider",
                parcel.delivery_status.as_str()
            ))
        })?;

        if assigned.email != actor.email {
            return Err(AppError::Forbidden(
                "parcel is not assigned to this rider".to_string(),
            ));
        }

        parcel.delivery_status = next;
        parcel.updated_at = Utc::now();

        if next == DeliveryStatus::Delivered {
            release_rider(state, &assigned.email);
        }

        (parcel.clone(), next, assigned.email)
    };

    state
        .metrics
        .status_transitions_total
        .with_label_values(&[next.as_str()])
        .inc();

    let (status, details) = match next {
        DeliveryStatus::InTransit => (TrackingStatus::InTransit, "Parcel is out for delivery"),
        _ => {
            state.metrics.deliveries_in_flight.dec();
            (TrackingStatus::Delivered, "Parcel delivered successfully")
        }
    };

    ledger::append(state, parcel_id, status, &actor.email, details, None);

    info!(
        parcel_id = %parcel_id,
        rider = %rider_email,
        status = next.as_str(),
        "delivery advanced"
    );

    Ok(updated)
}

// Called with the parcel entry lock held; lock order stays parcel then rider.
fn release_rider(state: &AppState, email: &str) {
    for mut rider in state.riders.iter_mut() {
        if rider.email == email {
            rider.status = RiderStatus::Available;
            rider.updated_at = Utc::now();
            return;
        }
    }

    // Rider record vanished while carrying a parcel: the compound
    // assign/advance write pair is broken. The parcel stays the source
    // of truth; flag the mismatch for reconciliation.
    state.metrics.inconsistencies_detected_total.inc();
    warn!(rider = %email, "delivered parcel references a missing rider record");
}

/// Remove a parcel before pickup. Its tracking history goes with it.
pub fn delete(state: &AppState, actor: &Actor, parcel_id: Uuid) -> Result<(), AppError> {
    RoleGate::require(actor, &[Role::User, Role::Admin])?;

    {
        let parcel = state
            .parcels
            .get(&parcel_id)
            .ok_or_else(|| AppError::NotFound(format!("parcel {parcel_id} not found")))?;

        if parcel.created_by != actor.email && !actor.is_admin() {
            return Err(AppError::Forbidden("only the parcel owner may delete it".to_string()));
        }

        if parcel.delivery_status != DeliveryStatus::Pending {
            return Err(AppError::StateConflict(
                "parcel is already picked up and can no longer be deleted".to_string(),
            ));
        }
    }

    // Re-check at commit time; the parcel may have been assigned since.
    let removed = state
        .parcels
        .remove_if(&parcel_id, |_, parcel| {
            parcel.delivery_status == DeliveryStatus::Pending
        });

    if removed.is_none() {
        return Err(AppError::StateConflict(
            "parcel is already picked up and can no longer be deleted".to_string(),
        ));
    }

    ledger::remove(state, parcel_id);
    info!(parcel_id = %parcel_id, "parcel deleted");

    Ok(())
}

fn ledger_delivery_status(state: &AppState, parcel_id: Uuid) -> Option<DeliveryStatus> {
    ledger::history(state, parcel_id)
        .iter()
        .rev()
        .find_map(|event| match event.status {
            TrackingStatus::Submitted => Some(DeliveryStatus::Pending),
            TrackingStatus::RiderAssigned => Some(DeliveryStatus::RiderAssigned),
            TrackingStatus::InTransit => Some(DeliveryStatus::InTransit),
            TrackingStatus::Delivered => Some(DeliveryStatus::Delivered),
            TrackingStatus::Paid => None,
        })
}

/// Cross-check every parcel's delivery status against its tracking
/// history. A mismatch means one half of a compound write went missing;
/// the pair is not atomic, so this is how such breaks are found.
pub fn detect_inconsistencies(state: &AppState) -> Vec<InconsistencyReport> {
    let mut reports = Vec::new();

    for entry in state.parcels.iter() {
        let parcel = entry.value();
        let ledger_status = ledger_delivery_status(state, parcel.id);

        if ledger_status != Some(parcel.delivery_status) {
            state.metrics.inconsistencies_detected_total.inc();
            reports.push(InconsistencyReport {
                parcel_id: parcel.id,
                parcel_status: parcel.delivery_status,
                ledger_status,
            });
        }
    }

    reports
}
