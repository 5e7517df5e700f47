use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{Actor, Role, RoleGate};
use crate::engine::earnings;
use crate::engine::ledger;
use crate::engine::lifecycle::{self, NewParcel, PaymentIntake};
use crate::engine::pricing::{self, CostBreakdown};
use crate::error::AppError;
use crate::models::parcel::{DeliveryStatus, Parcel, ParcelKind, PaymentStatus};
use crate::models::payment::PaymentRecord;
use crate::models::tracking::TrackingEvent;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/parcels", post(create_parcel).get(list_parcels))
        .route("/parcels/quote", post(quote_parcel))
        .route("/parcels/completed", get(completed_deliveries))
        .route("/parcels/:id", get(get_parcel).delete(delete_parcel))
        .route("/parcels/:id/payments", post(record_payment))
        .route("/parcels/:id/assign", post(assign_rider))
        .route("/parcels/:id/advance", post(advance_delivery))
        .route("/parcels/:id/trackings", get(tracking_history))
        .route("/payments", get(list_payments))
}

#[derive(Deserialize)]
pub struct QuoteRequest {
    #[serde(rename = "type")]
    pub kind: ParcelKind,
    #[serde(default)]
    pub weight_kg: Option<Decimal>,
    pub sender_service_center: String,
    pub receiver_service_center: String,
}

/// Cost preview for the booking form. Same pure function as the
/// authoritative charge at creation, so the two can never disagree.
async fn quote_parcel(
    Json(req): Json<QuoteRequest>,
) -> Result<Json<CostBreakdown>, AppError> {
    let weight_kg = req.weight_kg.unwrap_or(Decimal::ZERO);
    if weight_kg < Decimal::ZERO {
        return Err(AppError::Validation("weight_kg must not be negative".to_string()));
    }

    Ok(Json(pricing::quote(
        req.kind,
        weight_kg,
        &req.sender_service_center,
        &req.receiver_service_center,
    )))
}

async fn create_parcel(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<NewParcel>,
) -> Result<Json<Parcel>, AppError> {
    let parcel = lifecycle::create(&state, &actor, req)?;
    Ok(Json(parcel))
}

#[derive(Deserialize)]
pub struct ParcelFilter {
    pub payment_status: Option<PaymentStatus>,
    pub delivery_status: Option<DeliveryStatus>,
}

async fn list_parcels(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(filter): Query<ParcelFilter>,
) -> Json<Vec<Parcel>> {
    let mut parcels: Vec<Parcel> = state
        .parcels
        .iter()
        .filter(|entry| {
            let parcel = entry.value();

            let visible = match actor.role {
                Role::Admin => true,
                Role::User => parcel.created_by == actor.email,
                // A rider's work list: what is on their bike right now.
                Role::Rider => {
                    parcel.delivery_status != DeliveryStatus::Delivered
                        && parcel
                            .assigned_rider
                            .as_ref()
                            .is_some_and(|rider| rider.email == actor.email)
                }
            };

            visible
                && filter
                    .payment_status
                    .is_none_or(|wanted| parcel.payment_status == wanted)
                && filter
                    .delivery_status
                    .is_none_or(|wanted| parcel.delivery_status == wanted)
        })
        .map(|entry| entry.value().clone())
        .collect();

    parcels.sort_by_key(|parcel| std::cmp::Reverse(parcel.created_at));
    Json(parcels)
}

#[derive(Serialize)]
pub struct CompletedDelivery {
    #[serde(flatten)]
    pub parcel: Parcel,
    pub earning: Decimal,
    pub remaining: Decimal,
    pub earning_paid: bool,
}

/// A rider's delivered parcels with the earning figures derived from
/// the cash-out ledger at read time.
async fn completed_deliveries(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<CompletedDelivery>>, AppError> {
    RoleGate::require(&actor, &[Role::Rider])?;

    let records = earnings::cashouts_of(&state, &actor.email);

    let mut completed: Vec<CompletedDelivery> = state
        .parcels
        .iter()
        .filter(|entry| {
            let parcel = entry.value();
            parcel.delivery_status == DeliveryStatus::Delivered
                && parcel
                    .assigned_rider
                    .as_ref()
                    .is_some_and(|rider| rider.email == actor.email)
        })
        .map(|entry| {
            let parcel = entry.value().clone();
            let earning = earnings::parcel_earning(&parcel, &state.earnings);
            let remaining = earnings::remaining_payable(&parcel, &records, &state.earnings);
            CompletedDelivery {
                earning,
                remaining,
                earning_paid: remaining == Decimal::ZERO,
                parcel,
            }
        })
        .collect();

    completed.sort_by_key(|item| std::cmp::Reverse(item.parcel.updated_at));
    Ok(Json(completed))
}

fn may_view(parcel: &Parcel, actor: &Actor) -> bool {
    actor.is_admin()
        || parcel.created_by == actor.email
        || parcel
            .assigned_rider
            .as_ref()
            .is_some_and(|rider| rider.email == actor.email)
}

async fn get_parcel(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Parcel>, AppError> {
    let parcel = state
        .parcels
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("parcel {id} not found")))?;

    if !may_view(parcel.value(), &actor) {
        return Err(AppError::Forbidden("parcel belongs to another user".to_string()));
    }

    Ok(Json(parcel.value().clone()))
}

async fn delete_parcel(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    lifecycle::delete(&state, &actor, id)?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

async fn record_payment(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(intake): Json<PaymentIntake>,
) -> Result<Json<PaymentRecord>, AppError> {
    let record = lifecycle::record_payment(&state, &actor, id, intake)?;
    Ok(Json(record))
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub rider_id: Uuid,
}

async fn assign_rider(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<Parcel>, AppError> {
    let parcel = lifecycle::assign_rider(&state, &actor, id, req.rider_id)?;
    Ok(Json(parcel))
}

async fn advance_delivery(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Parcel>, AppError> {
    let parcel = lifecycle::advance(&state, &actor, id)?;
    Ok(Json(parcel))
}

async fn tracking_history(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TrackingEvent>>, AppError> {
    let parcel = state
        .parcels
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("parcel {id} not found")))?;

    if !may_view(parcel.value(), &actor) {
        return Err(AppError::Forbidden("parcel belongs to another user".to_string()));
    }
    drop(parcel);

    Ok(Json(ledger::history(&state, id)))
}

#[derive(Deserialize)]
pub struct PaymentHistoryFilter {
    pub email: Option<String>,
}

async fn list_payments(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(filter): Query<PaymentHistoryFilter>,
) -> Result<Json<Vec<PaymentRecord>>, AppError> {
    let email = match (&actor.role, filter.email) {
        (Role::Admin, Some(email)) => email,
        (Role::Admin, None) => actor.email.clone(),
        (_, Some(email)) if email != actor.email => {
            return Err(AppError::Forbidden(
                "payment history of another user is not visible".to_string(),
            ));
        }
        _ => actor.email.clone(),
    };

    let mut payments: Vec<PaymentRecord> = state
        .payments
        .iter()
        .filter(|entry| entry.value().email == email)
        .map(|entry| entry.value().clone())
        .collect();

    payments.sort_by_key(|payment| std::cmp::Reverse(payment.paid_at));
    Ok(Json(payments))
}
