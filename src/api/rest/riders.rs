use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{Actor, Role, RoleGate};
use crate::error::AppError;
use crate::models::rider::{Rider, RiderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/riders", post(apply).get(list_riders))
        .route("/riders/:id/approve", patch(approve))
        .route("/riders/:id/demote", patch(demote))
        .route("/riders/:id", axum::routing::delete(delete_rider))
}

#[derive(Deserialize)]
pub struct RiderApplication {
    pub name: String,
    pub phone: String,
    pub age: u8,
    pub region: String,
    pub district: String,
    pub nid: String,
    pub bike_brand: String,
    pub bike_reg_no: String,
}

/// A user applies to become a rider; the application sits pending until
/// an admin approves it. The applicant's identity is the actor's.
async fn apply(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(application): Json<RiderApplication>,
) -> Result<Json<Rider>, AppError> {
    RoleGate::require(&actor, &[Role::User, Role::Admin])?;

    for (name, value) in [
        ("name", &application.name),
        ("phone", &application.phone),
        ("region", &application.region),
        ("district", &application.district),
        ("nid", &application.nid),
        ("bike_brand", &application.bike_brand),
        ("bike_reg_no", &application.bike_reg_no),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{name} is required")));
        }
    }

    if application.age < 18 {
        return Err(AppError::Validation("riders must be at least 18".to_string()));
    }

    let already_applied = state
        .riders
        .iter()
        .any(|entry| entry.value().email == actor.email);
    if already_applied {
        return Err(AppError::StateConflict(
            "a rider application already exists for this account".to_string(),
        ));
    }

    let now = Utc::now();
    let rider = Rider {
        id: Uuid::new_v4(),
        name: application.name,
        email: actor.email.clone(),
        phone: application.phone,
        age: application.age,
        region: application.region,
        district: application.district,
        nid: application.nid,
        bike_brand: application.bike_brand,
        bike_reg_no: application.bike_reg_no,
        status: RiderStatus::Pending,
        applied_at: now,
        updated_at: now,
    };

    state.riders.insert(rider.id, rider.clone());
    tracing::info!(rider = %rider.email, district = %rider.district, "rider application received");

    Ok(Json(rider))
}

#[derive(Deserialize)]
pub struct RiderFilter {
    pub status: Option<RiderStatus>,
    pub district: Option<String>,
}

async fn list_riders(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(filter): Query<RiderFilter>,
) -> Result<Json<Vec<Rider>>, AppError> {
    RoleGate::require(&actor, &[Role::Admin])?;

    let mut riders: Vec<Rider> = state
        .riders
        .iter()
        .filter(|entry| {
            let rider = entry.value();
            filter.status.is_none_or(|wanted| rider.status == wanted)
                && filter
                    .district
                    .as_deref()
                    .is_none_or(|wanted| rider.district.eq_ignore_ascii_case(wanted))
        })
        .map(|entry| entry.value().clone())
        .collect();

    riders.sort_by_key(|rider| rider.applied_at);
    Ok(Json(riders))
}

async fn approve(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Rider>, AppError> {
    RoleGate::require(&actor, &[Role::Admin])?;

    let mut rider = state
        .riders
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("rider {id} not found")))?;

    if rider.status != RiderStatus::Pending {
        return Err(AppError::StateConflict(format!(
            "rider application is not pending ({:?})",
            rider.status
        )));
    }

    rider.status = RiderStatus::Available;
    rider.updated_at = Utc::now();
    tracing::info!(rider = %rider.email, "rider approved");

    Ok(Json(rider.clone()))
}

/// Send an active rider back to pending review. Not possible while
/// they are carrying a parcel.
async fn demote(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Rider>, AppError> {
    RoleGate::require(&actor, &[Role::Admin])?;

    let mut rider = state
        .riders
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("rider {id} not found")))?;

    if rider.status != RiderStatus::Available {
        return Err(AppError::StateConflict(format!(
            "only available riders can be demoted ({:?})",
            rider.status
        )));
    }

    rider.status = RiderStatus::Pending;
    rider.updated_at = Utc::now();

    Ok(Json(rider.clone()))
}

async fn delete_rider(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    RoleGate::require(&actor, &[Role::Admin])?;

    {
        let rider = state
            .riders
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("rider {id} not found")))?;

        if rider.status == RiderStatus::InDelivery {
            return Err(AppError::StateConflict(
                "rider is carrying a parcel and cannot be removed".to_string(),
            ));
        }
    }

    let removed = state
        .riders
        .remove_if(&id, |_, rider| rider.status != RiderStatus::InDelivery);
    if removed.is_none() {
        return Err(AppError::StateConflict(
            "rider is carrying a parcel and cannot be removed".to_string(),
        ));
    }

    Ok(Json(serde_json::json!({ "deleted": id })))
}
