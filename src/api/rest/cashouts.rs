use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;

use crate::auth::{Actor, Role, RoleGate};
use crate::engine::earnings::{self, CashoutRequest, EarningsSummary};
use crate::error::AppError;
use crate::models::cashout::CashoutRecord;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cashouts", post(request_cashout).get(list_cashouts))
        .route("/earnings/:email", get(earnings_summary))
}

async fn request_cashout(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Json(req): Json<CashoutRequest>,
) -> Result<Json<CashoutRecord>, AppError> {
    let record = earnings::request_cashout(&state, &actor, req)?;
    Ok(Json(record))
}

#[derive(Deserialize)]
pub struct CashoutHistoryFilter {
    pub email: Option<String>,
}

async fn list_cashouts(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Query(filter): Query<CashoutHistoryFilter>,
) -> Result<Json<Vec<CashoutRecord>>, AppError> {
    RoleGate::require(&actor, &[Role::Rider, Role::Admin])?;

    let email = match (&actor.role, filter.email) {
        (Role::Admin, Some(email)) => email,
        (Role::Rider, Some(email)) if email != actor.email => {
            return Err(AppError::Forbidden(
                "cash-out history of another rider is not visible".to_string(),
            ));
        }
        _ => actor.email.clone(),
    };

    Ok(Json(earnings::cashouts_of(&state, &email)))
}

async fn earnings_summary(
    State(state): State<Arc<AppState>>,
    actor: Actor,
    Path(email): Path<String>,
) -> Result<Json<EarningsSummary>, AppError> {
    RoleGate::require(&actor, &[Role::Rider, Role::Admin])?;

    if actor.role == Role::Rider && actor.email != email {
        return Err(AppError::Forbidden(
            "earnings of another rider are not visible".to_string(),
        ));
    }

    Ok(Json(earnings::summary(&state, &email, Utc::now())))
}
