pub mod cashouts;
pub mod parcels;
pub mod riders;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::auth::{Actor, Role, RoleGate};
use crate::engine::lifecycle::{self, InconsistencyReport};
use crate::error::AppError;
use crate::models::parcel::DeliveryStatus;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(parcels::router())
        .merge(riders::router())
        .merge(cashouts::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/dashboard", get(dashboard))
        .route("/reconciliation", get(reconciliation))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    parcels: usize,
    riders: usize,
    cashouts: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        parcels: state.parcels.len(),
        riders: state.riders.len(),
        cashouts: state.cashouts.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

#[derive(Serialize)]
struct StatusCount {
    status: DeliveryStatus,
    count: usize,
}

/// Delivery-status counts, scoped to what the caller is allowed to see:
/// users their own parcels, riders their assigned ones, admins everything.
async fn dashboard(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Json<Vec<StatusCount>> {
    let mut counts = std::collections::HashMap::new();

    for entry in state.parcels.iter() {
        let parcel = entry.value();
        let visible = match actor.role {
            Role::Admin => true,
            Role::User => parcel.created_by == actor.email,
            Role::Rider => parcel
                .assigned_rider
                .as_ref()
                .is_some_and(|rider| rider.email == actor.email),
        };

        if visible {
            *counts.entry(parcel.delivery_status).or_insert(0usize) += 1;
        }
    }

    let mut items: Vec<StatusCount> = counts
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();
    items.sort_by_key(|item| item.status.as_str());

    Json(items)
}

async fn reconciliation(
    State(state): State<Arc<AppState>>,
    actor: Actor,
) -> Result<Json<Vec<InconsistencyReport>>, AppError> {
    RoleGate::require(&actor, &[Role::Admin])?;
    Ok(Json(lifecycle::detect_inconsistencies(&state)))
}
