use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use parcel_hub::api::rest::router;
use parcel_hub::config::EarningsPolicy;
use parcel_hub::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

const CUSTOMER: (&str, &str) = ("customer@example.com", "user");
const ADMIN: (&str, &str) = ("admin@example.com", "admin");
const RIDER: (&str, &str) = ("rider@example.com", "rider");

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(1024, EarningsPolicy::default()));
    (router(state.clone()), state)
}

fn request(method: &str, uri: &str, actor: Option<(&str, &str)>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some((email, role)) = actor {
        builder = builder
            .header("x-actor-email", email)
            .header("x-actor-role", role);
    }

    match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&value).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn parcel_payload(weight: f64) -> Value {
    json!({
        "title": "Electronics",
        "type": "non-document",
        "weight_kg": weight,
        "sender_name": "Sender",
        "sender_contact": "01700000000",
        "sender_region": "Dhaka",
        "sender_service_center": "Dhaka",
        "sender_address": "House 1, Road 2",
        "pickup_instruction": "Call on arrival",
        "receiver_name": "Receiver",
        "receiver_contact": "01800000000",
        "receiver_region": "Dhaka",
        "receiver_service_center": "Dhaka",
        "receiver_address": "House 3, Road 4",
        "delivery_instruction": "Leave at reception"
    })
}

async fn create_parcel(app: &axum::Router, weight: f64) -> Value {
    let response = app
        .clone()
        .oneshot(request("POST", "/parcels", Some(CUSTOMER), Some(parcel_payload(weight))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

async fn pay_parcel(app: &axum::Router, parcel: &Value) {
    let id = parcel["id"].as_str().unwrap();
    let cost = parcel["cost"].as_f64().unwrap();
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            &format!("/parcels/{id}/payments"),
            Some(CUSTOMER),
            Some(json!({ "amount": cost, "transaction_id": "txn_100" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn approved_rider(app: &axum::Router, actor: (&str, &str), district: &str) -> String {
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/riders",
            Some((actor.0, "user")),
            Some(json!({
                "name": "Test Rider",
                "phone": "01900000000",
                "age": 25,
                "region": "Dhaka",
                "district": district,
                "nid": "1234567890",
                "bike_brand": "Honda",
                "bike_reg_no": "DHA-1234"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rider = body_json(response).await;
    let id = rider["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(request("PATCH", &format!("/riders/{id}/approve"), Some(ADMIN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    id
}

async fn assign(app: &axum::Router, parcel_id: &str, rider_id: &str) -> axum::response::Response {
    app.clone()
        .oneshot(request(
            "POST",
            &format!("/parcels/{parcel_id}/assign"),
            Some(ADMIN),
            Some(json!({ "rider_id": rider_id })),
        ))
        .await
        .unwrap()
}

async fn advance(app: &axum::Router, parcel_id: &str, actor: (&str, &str)) -> axum::response::Response {
    app.clone()
        .oneshot(request(
            "POST",
            &format!("/parcels/{parcel_id}/advance"),
            Some(actor),
            None,
        ))
        .await
        .unwrap()
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(request("GET", "/health", None, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["parcels"], 0);
    assert_eq!(body["riders"], 0);
    assert_eq!(body["cashouts"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(request("GET", "/metrics", None, None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    assert!(body.contains("parcels_created_total"));
    assert!(body.contains("deliveries_in_flight"));
}

#[tokio::test]
async fn quote_matches_the_pricing_table() {
    let (app, _state) = setup();

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/parcels/quote",
            None,
            Some(json!({
                "type": "non-document",
                "weight_kg": 5,
                "sender_service_center": "Dhaka",
                "receiver_service_center": "Khulna"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["base"], 150.0);
    assert_eq!(body["extra_weight"], 80.0);
    assert_eq!(body["inter_district"], 40.0);
    assert_eq!(body["total"], 270.0);

    let response = app
        .oneshot(request(
            "POST",
            "/parcels/quote",
            None,
            Some(json!({
                "type": "document",
                "weight_kg": 99,
                "sender_service_center": "Dhaka",
                "receiver_service_center": "Khulna"
            })),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["total"], 80.0);
}

#[tokio::test]
async fn create_parcel_prices_once_and_starts_pending_unpaid() {
    let (app, _state) = setup();
    let parcel = create_parcel(&app, 2.0).await;

    assert_eq!(parcel["delivery_status"], "pending");
    assert_eq!(parcel["payment_status"], "unpaid");
    assert_eq!(parcel["cost"], 110.0);
    assert!(parcel["assigned_rider"].is_null());
    assert!(parcel["tracking_code"].as_str().unwrap().starts_with("PCL-"));

    let id = parcel["id"].as_str().unwrap();
    let response = app
        .oneshot(request("GET", &format!("/parcels/{id}/trackings"), Some(CUSTOMER), None))
        .await
        .unwrap();
    let events = body_json(response).await;
    assert_eq!(events.as_array().unwrap().len(), 1);
    assert_eq!(events[0]["status"], "submitted");
}

#[tokio::test]
async fn create_parcel_without_identity_is_unauthorized() {
    let (app, _state) = setup();
    let response = app
        .oneshot(request("POST", "/parcels", None, Some(parcel_payload(1.0))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_parcel_with_missing_field_is_rejected() {
    let (app, _state) = setup();
    let mut payload = parcel_payload(1.0);
    payload["receiver_contact"] = json!("   ");

    let response = app
        .oneshot(request("POST", "/parcels", Some(CUSTOMER), Some(payload)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn create_parcel_with_unknown_type_is_rejected() {
    let (app, _state) = setup();
    let mut payload = parcel_payload(1.0);
    payload["type"] = json!("groceries");

    let response = app
        .oneshot(request("POST", "/parcels", Some(CUSTOMER), Some(payload)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn get_nonexistent_parcel_returns_404() {
    let (app, _state) = setup();
    let fake_id = "00000000-0000-0000-0000-000000000000";
    let response = app
        .oneshot(request("GET", &format!("/parcels/{fake_id}"), Some(ADMIN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn assignment_requires_payment() {
    let (app, _state) = setup();
    let parcel = create_parcel(&app, 2.0).await;
    let rider_id = approved_rider(&app, RIDER, "Dhaka").await;

    let response = assign(&app, parcel["id"].as_str().unwrap(), &rider_id).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = body_json(response).await;
    assert_eq!(body["kind"], "stale_state");
}

#[tokio::test]
async fn only_admins_may_assign_riders() {
    let (app, _state) = setup();
    let parcel = create_parcel(&app, 2.0).await;
    pay_parcel(&app, &parcel).await;
    let rider_id = approved_rider(&app, RIDER, "Dhaka").await;

    let response = app
        .oneshot(request(
            "POST",
            &format!("/parcels/{}/assign", parcel["id"].as_str().unwrap()),
            Some(CUSTOMER),
            Some(json!({ "rider_id": rider_id })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn full_delivery_flow() {
    let (app, _state) = setup();
    let parcel = create_parcel(&app, 2.0).await;
    let parcel_id = parcel["id"].as_str().unwrap().to_string();
    pay_parcel(&app, &parcel).await;
    let rider_id = approved_rider(&app, RIDER, "Dhaka").await;

    let response = assign(&app, &parcel_id, &rider_id).await;
    assert_eq!(response.status(), StatusCode::OK);
    let assigned = body_json(response).await;
    assert_eq!(assigned["delivery_status"], "rider-assigned");
    assert_eq!(assigned["assigned_rider"]["email"], RIDER.0);

    let riders = app
        .clone()
        .oneshot(request("GET", "/riders?status=in-delivery", Some(ADMIN), None))
        .await
        .unwrap();
    assert_eq!(body_json(riders).await.as_array().unwrap().len(), 1);

    let response = advance(&app, &parcel_id, RIDER).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["delivery_status"], "in-transit");

    let response = advance(&app, &parcel_id, RIDER).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["delivery_status"], "delivered");

    // Delivery frees the rider for the next assignment.
    let riders = app
        .clone()
        .oneshot(request("GET", "/riders?status=available", Some(ADMIN), None))
        .await
        .unwrap();
    assert_eq!(body_json(riders).await.as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(request("GET", &format!("/parcels/{parcel_id}/trackings"), Some(CUSTOMER), None))
        .await
        .unwrap();
    let events = body_json(response).await;
    let statuses: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["status"].as_str().unwrap())
        .collect();
    assert_eq!(
        statuses,
        vec!["submitted", "paid", "rider_assigned", "in-transit", "delivered"]
    );

    // A delivered parcel cannot advance further.
    let response = advance(&app, &parcel_id, RIDER).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn advance_from_pending_is_a_conflict() {
    let (app, _state) = setup();
    let parcel = create_parcel(&app, 2.0).await;

    let response = advance(&app, parcel["id"].as_str().unwrap(), RIDER).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn racing_assignments_have_exactly_one_winner() {
    let (app, _state) = setup();
    let parcel = create_parcel(&app, 2.0).await;
    let parcel_id = parcel["id"].as_str().unwrap().to_string();
    pay_parcel(&app, &parcel).await;

    let first = approved_rider(&app, ("first@example.com", "rider"), "Dhaka").await;
    let second = approved_rider(&app, ("second@example.com", "rider"), "Dhaka").await;

    let (res_a, res_b) = tokio::join!(
        assign(&app, &parcel_id, &first),
        assign(&app, &parcel_id, &second)
    );

    let mut statuses = vec![res_a.status(), res_b.status()];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);

    let response = app
        .oneshot(request("GET", &format!("/parcels/{parcel_id}"), Some(ADMIN), None))
        .await
        .unwrap();
    let stored = body_json(response).await;
    let winner = stored["assigned_rider"]["email"].as_str().unwrap();
    assert!(winner == "first@example.com" || winner == "second@example.com");
}

#[tokio::test]
async fn delete_is_only_possible_before_pickup() {
    let (app, _state) = setup();

    let pending = create_parcel(&app, 2.0).await;
    let response = app
        .clone()
        .oneshot(request(
            "DELETE",
            &format!("/parcels/{}", pending["id"].as_str().unwrap()),
            Some(CUSTOMER),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let assigned = create_parcel(&app, 2.0).await;
    let assigned_id = assigned["id"].as_str().unwrap().to_string();
    pay_parcel(&app, &assigned).await;
    let rider_id = approved_rider(&app, RIDER, "Dhaka").await;
    assert_eq!(assign(&app, &assigned_id, &rider_id).await.status(), StatusCode::OK);

    let response = app
        .oneshot(request("DELETE", &format!("/parcels/{assigned_id}"), Some(CUSTOMER), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn cashout_boundaries_and_shared_pool() {
    let (app, _state) = setup();

    // weight 25.25 same-district: 110 + 22.25 * 40 = 1000, earning 750.
    let parcel = create_parcel(&app, 25.25).await;
    let parcel_id = parcel["id"].as_str().unwrap().to_string();
    assert_eq!(parcel["cost"], 1000.0);
    pay_parcel(&app, &parcel).await;
    let rider_id = approved_rider(&app, RIDER, "Dhaka").await;
    assert_eq!(assign(&app, &parcel_id, &rider_id).await.status(), StatusCode::OK);
    assert_eq!(advance(&app, &parcel_id, RIDER).await.status(), StatusCode::OK);
    assert_eq!(advance(&app, &parcel_id, RIDER).await.status(), StatusCode::OK);

    // Below the minimum threshold.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/cashouts",
            Some(RIDER),
            Some(json!({ "amount": 199.99 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["kind"], "limit_exceeded");

    // Exactly the minimum is accepted.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/cashouts",
            Some(RIDER),
            Some(json!({ "amount": 200 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The bulk draw above already consumed 200 of the 750 pool, so a
    // per-parcel request may draw at most 550 despite the parcel
    // having no per-parcel cash-outs yet.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/cashouts",
            Some(RIDER),
            Some(json!({ "parcel_id": parcel_id, "amount": 600 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/cashouts",
            Some(RIDER),
            Some(json!({ "parcel_id": parcel_id, "amount": 550 })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(request("GET", &format!("/earnings/{}", RIDER.0), Some(RIDER), None))
        .await
        .unwrap();
    let summary = body_json(response).await;
    assert_eq!(summary["total_earnings"], 750.0);
    assert_eq!(summary["total_cashed_out"], 750.0);
    assert_eq!(summary["pending_earnings"], 0.0);

    let response = app
        .clone()
        .oneshot(request("GET", "/parcels/completed", Some(RIDER), None))
        .await
        .unwrap();
    let completed = body_json(response).await;
    assert_eq!(completed[0]["earning"], 750.0);
    assert_eq!(completed[0]["remaining"], 0.0);
    assert_eq!(completed[0]["earning_paid"], true);

    let response = app
        .oneshot(request("GET", "/cashouts", Some(RIDER), None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn dashboard_counts_are_scoped_by_role() {
    let (app, _state) = setup();
    let parcel = create_parcel(&app, 2.0).await;
    pay_parcel(&app, &parcel).await;
    let rider_id = approved_rider(&app, RIDER, "Dhaka").await;
    assert_eq!(
        assign(&app, parcel["id"].as_str().unwrap(), &rider_id).await.status(),
        StatusCode::OK
    );

    let response = app
        .clone()
        .oneshot(request("GET", "/dashboard", Some(CUSTOMER), None))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body[0]["status"], "rider-assigned");
    assert_eq!(body[0]["count"], 1);

    let response = app
        .clone()
        .oneshot(request("GET", "/dashboard", Some(("stranger@example.com", "user")), None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 0);

    let response = app
        .oneshot(request("GET", "/dashboard", Some(RIDER), None))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body[0]["count"], 1);
}

#[tokio::test]
async fn reconciliation_is_admin_only_and_empty_when_consistent() {
    let (app, _state) = setup();
    create_parcel(&app, 2.0).await;

    let response = app
        .clone()
        .oneshot(request("GET", "/reconciliation", Some(CUSTOMER), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(request("GET", "/reconciliation", Some(ADMIN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn rider_lifecycle_is_guarded() {
    let (app, _state) = setup();

    // Applications land pending and are not assignable.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/riders",
            Some(("applicant@example.com", "user")),
            Some(json!({
                "name": "Applicant",
                "phone": "01900000001",
                "age": 21,
                "region": "Dhaka",
                "district": "Dhaka",
                "nid": "9876543210",
                "bike_brand": "Yamaha",
                "bike_reg_no": "DHA-9999"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rider = body_json(response).await;
    assert_eq!(rider["status"], "pending");
    let rider_id = rider["id"].as_str().unwrap().to_string();

    let parcel = create_parcel(&app, 2.0).await;
    pay_parcel(&app, &parcel).await;
    let response = assign(&app, parcel["id"].as_str().unwrap(), &rider_id).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Underage applications are rejected.
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/riders",
            Some(("kid@example.com", "user")),
            Some(json!({
                "name": "Kid",
                "phone": "01900000002",
                "age": 16,
                "region": "Dhaka",
                "district": "Dhaka",
                "nid": "1111111111",
                "bike_brand": "Honda",
                "bike_reg_no": "DHA-1111"
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Riders cannot list other riders.
    let response = app
        .oneshot(request("GET", "/riders", Some(RIDER), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn rider_carrying_a_parcel_cannot_be_deleted() {
    let (app, _state) = setup();
    let parcel = create_parcel(&app, 2.0).await;
    pay_parcel(&app, &parcel).await;
    let rider_id = approved_rider(&app, RIDER, "Dhaka").await;
    assert_eq!(
        assign(&app, parcel["id"].as_str().unwrap(), &rider_id).await.status(),
        StatusCode::OK
    );

    let response = app
        .clone()
        .oneshot(request("DELETE", &format!("/riders/{rider_id}"), Some(ADMIN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(request("PATCH", &format!("/riders/{rider_id}/demote"), Some(ADMIN), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn payment_history_is_per_user() {
    let (app, _state) = setup();
    let parcel = create_parcel(&app, 2.0).await;
    pay_parcel(&app, &parcel).await;

    let response = app
        .clone()
        .oneshot(request("GET", "/payments", Some(CUSTOMER), None))
        .await
        .unwrap();
    let payments = body_json(response).await;
    assert_eq!(payments.as_array().unwrap().len(), 1);
    assert_eq!(payments[0]["transaction_id"], "txn_100");
    assert_eq!(payments[0]["amount"], 110.0);

    let response = app
        .oneshot(request("GET", "/payments", Some(("stranger@example.com", "user")), None))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 0);
}
