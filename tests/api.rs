//! End-to-end tests through the router, backed by the in-memory store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use gatepass_server::external::{TracingNotifier, TracingStorage};
use gatepass_server::handlers::AppState;
use gatepass_server::routes::create_routes;
use gatepass_server::services::{TicketingService, WalletService};
use gatepass_server::store::{MemoryStore, Store};

struct TestApp {
    router: Router,
    host_id: Uuid,
    admin_id: Uuid,
}

async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let host = store
        .create_host("Ada".to_string(), "ada@example.com".to_string())
        .await
        .unwrap();
    let notifier = Arc::new(TracingNotifier);
    let storage = Arc::new(TracingStorage);
    let state = AppState {
        ticketing: Arc::new(TicketingService::new(
            store.clone(),
            notifier.clone(),
            storage.clone(),
        )),
        wallet: Arc::new(WalletService::new(
            store,
            notifier,
            storage,
            Decimal::from(100),
        )),
    };
    TestApp {
        router: create_routes(state),
        host_id: host.id,
        admin_id: Uuid::new_v4(),
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post(app: &TestApp, uri: &str, body: Value, as_host: bool) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if as_host {
        builder = builder.header("x-host-id", app.host_id.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn admin_post(app: &TestApp, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-admin-id", app.admin_id.to_string())
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn create_event(app: &TestApp) -> Uuid {
    let (status, body) = send(
        app,
        post(
            app,
            "/events",
            json!({
                "title": "Launch Night",
                "venue": "Hall A",
                "startsAt": "2026-10-01T18:00:00Z",
            }),
            true,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().unwrap().parse().unwrap()
}

async fn create_vip_tier(app: &TestApp, event_id: Uuid, quantity: u32) {
    let (status, body) = send(
        app,
        post(
            app,
            &format!("/events/{event_id}/tiers"),
            json!({
                "tierId": "vip",
                "name": "VIP",
                "ticketType": "individual",
                "perTicketPrice": "500",
                "currency": "NGN",
                "quantity": quantity,
            }),
            true,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
}

fn purchase_body(quantity: u32, reference: &str, fees: &str) -> Value {
    json!({
        "paymentReference": reference,
        "fees": fees,
        "items": [{
            "tierId": "vip",
            "quantity": quantity,
            "buyerName": "Bola",
            "buyerEmail": "bola@example.com",
        }],
    })
}

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app().await;
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn mutating_routes_require_an_identity() {
    let app = spawn_app().await;
    let (status, body) = send(
        &app,
        post(&app, "/events", json!({"title": "x", "venue": "y", "startsAt": "2026-10-01T18:00:00Z"}), false),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn vip_sellout_and_check_in_flow() {
    let app = spawn_app().await;
    let event_id = create_event(&app).await;
    create_vip_tier(&app, event_id, 2).await;

    // subtotal 1000: 1.5% + 2% of gross
    let (status, body) = send(
        &app,
        post(
            &app,
            &format!("/events/{event_id}/purchase"),
            purchase_body(2, "pay_001", "35.00"),
            false,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    let tickets = body["data"]["tickets"].as_array().unwrap();
    assert_eq!(tickets.len(), 2);
    let code = tickets[0]["code"].as_str().unwrap().to_string();

    // Sold out now; the conflict names the tier.
    let (status, body) = send(
        &app,
        post(
            &app,
            &format!("/events/{event_id}/purchase"),
            purchase_body(1, "pay_002", "17.50"),
            false,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_STOCK");
    assert_eq!(body["error"]["details"]["tier"], "VIP");

    // First check-in succeeds, the retry is rejected.
    let (status, body) = send(
        &app,
        post(
            &app,
            &format!("/events/{event_id}/check-in"),
            json!({ "identifier": code }),
            true,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["ticket"]["status"], "used");

    let (status, body) = send(
        &app,
        post(
            &app,
            &format!("/events/{event_id}/check-in"),
            json!({ "identifier": code }),
            true,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "TICKET_ALREADY_USED");

    // Search by buyer email stays within one page.
    let request = Request::builder()
        .uri(format!("/events/{event_id}/tickets/search?q=bola"))
        .header("x-host-id", app.host_id.to_string())
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn wallet_and_payout_review_flow() {
    let app = spawn_app().await;
    let event_id = create_event(&app).await;
    create_vip_tier(&app, event_id, 4).await;

    let (status, body) = send(
        &app,
        post(
            &app,
            &format!("/events/{event_id}/purchase"),
            purchase_body(4, "pay_003", "70.00"),
            false,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    // Withdrawal before bank details are on file.
    let (status, body) = send(
        &app,
        post(&app, "/wallet/withdrawals", json!({"amount": "600"}), true),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "MISSING_BANK_DETAILS");

    let request = Request::builder()
        .method("PUT")
        .uri("/wallet/bank-details")
        .header("content-type", "application/json")
        .header("x-host-id", app.host_id.to_string())
        .body(Body::from(
            json!({
                "bankName": "First Bank",
                "bankCode": "011",
                "accountNumber": "0123456789",
                "accountName": "Ada",
            })
            .to_string(),
        ))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    // Two pending withdrawals may both be created against a 2000 balance.
    let mut payout_ids = Vec::new();
    for _ in 0..2 {
        let (status, body) = send(
            &app,
            post(&app, "/wallet/withdrawals", json!({"amount": "1200"}), true),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["payout"]["status"], "pending");
        payout_ids.push(body["data"]["payout"]["id"].as_str().unwrap().to_string());
    }

    // Balance still undebited while pending.
    let request = Request::builder()
        .uri("/wallet")
        .header("x-host-id", app.host_id.to_string())
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["balance"], "2000");

    // Only one of the two can survive approval.
    let (status, body) = send(
        &app,
        admin_post(
            &app,
            &format!("/admin/payouts/{}/approve", payout_ids[0]),
            json!({"amount": "1200", "proofDocument": "receipt-001"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["payout"]["status"], "completed");

    let (status, body) = send(
        &app,
        admin_post(
            &app,
            &format!("/admin/payouts/{}/approve", payout_ids[1]),
            json!({"amount": "1200"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_BALANCE");
    assert_eq!(body["error"]["details"]["balance"], "800");

    // Reject the survivor's twin; the ledger is untouched by rejection.
    let (status, body) = send(
        &app,
        admin_post(
            &app,
            &format!("/admin/payouts/{}/reject", payout_ids[1]),
            json!({"reason": "Balance exhausted"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["payout"]["status"], "rejected");

    let request = Request::builder()
        .uri("/wallet")
        .header("x-host-id", app.host_id.to_string())
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["balance"], "800");
    assert_eq!(body["data"]["payouts"].as_array().unwrap().len(), 2);

    // Platform revenue over a window covering the sale.
    let request = Request::builder()
        .uri("/admin/revenue/daily?from=2020-01-01T00:00:00Z&to=2030-01-01T00:00:00Z")
        .header("x-admin-id", app.admin_id.to_string())
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["gross"], "2000");
    assert_eq!(body["data"]["transactions"], 1);
}

#[tokio::test]
async fn tier_validation_failures_come_back_as_field_errors() {
    let app = spawn_app().await;
    let event_id = create_event(&app).await;

    let (status, body) = send(
        &app,
        post(
            &app,
            &format!("/events/{event_id}/tiers"),
            json!({
                "tierId": "table",
                "name": "Table",
                "ticketType": "group",
                "currency": "NGN",
                "quantity": 5,
            }),
            true,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    let details = body["error"]["details"].as_array().unwrap();
    assert!(details
        .iter()
        .any(|field| field["field"] == "groupSize"));
    assert!(details
        .iter()
        .any(|field| field["field"] == "groupPrice"));
}
