use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use boxoffice_api::{app, AppState};
use boxoffice_catalog::{Event, EventCatalog, TicketType};
use boxoffice_core::ManualClock;
use boxoffice_order::SettlementServices;
use boxoffice_store::app_config::CheckoutRules;
use boxoffice_store::{MemorySlotStore, MockBackend, SlotStore};
use chrono::{Duration, Utc};
use futures_util::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    backend: Arc<MockBackend>,
    clock: Arc<ManualClock>,
    event: Event,
    ticket: TicketType,
}

fn rules() -> CheckoutRules {
    CheckoutRules {
        order_ttl_seconds: 600,
        per_type_cap: 10,
        sale_tick_millis: 1_000,
        gateway_return_url: "http://localhost:8080/v1/payments/gateway/return".to_string(),
        gateway_success_code: "00".to_string(),
    }
}

fn setup(balance: i64, sale_opens_in: Duration) -> TestApp {
    let now = Utc::now();
    let clock = Arc::new(ManualClock::new(now));
    let backend = Arc::new(MockBackend::new().with_clock(clock.clone()));
    let event = Event {
        id: Uuid::new_v4(),
        name: "Indie Night".to_string(),
        venue: "Warehouse 9".to_string(),
        start_time: now + Duration::days(14),
        max_tickets_per_user: 4,
        sale_start_time: now + sale_opens_in,
        sale_end_time: None,
    };
    let ticket = TicketType {
        id: Uuid::new_v4(),
        name: "Standing".to_string(),
        price: 250_000,
        original_price: None,
        available_quantity: 100,
    };
    backend.add_catalog(EventCatalog {
        event: event.clone(),
        ticket_types: vec![ticket.clone()],
    });
    backend.set_balance(balance);

    let slots: Arc<dyn SlotStore> = Arc::new(MemorySlotStore::new());
    let services =
        SettlementServices::from_backend(backend.clone(), slots).with_clock(clock.clone());
    let state = AppState::new(backend.clone(), services, &rules());

    TestApp {
        router: app(state),
        backend,
        clock,
        event,
        ticket,
    }
}

async fn send(
    app: &TestApp,
    method: &str,
    uri: &str,
    session: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(session) = session {
        builder = builder.header("x-session-id", session);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn add_tickets(app: &TestApp, session: &str, quantity: u32) -> (StatusCode, Value) {
    send(
        app,
        "POST",
        "/v1/cart/items",
        Some(session),
        Some(json!({
            "event_id": app.event.id,
            "ticket_type_id": app.ticket.id,
            "quantity": quantity,
        })),
    )
    .await
}

#[tokio::test]
async fn test_cart_add_and_read_back() {
    let app = setup(0, -Duration::hours(1));

    let (status, body) = add_tickets(&app, "s1", 2).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_quantity"], 2);
    assert_eq!(body["total_amount"], 500_000);

    let (status, body) = send(&app, "GET", "/v1/cart", Some("s1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event_id"], json!(app.event.id));
    assert_eq!(body["items"][0]["ticket_type_name"], "Standing");

    // Other sessions see their own cart.
    let (_, body) = send(&app, "GET", "/v1/cart", Some("s2"), None).await;
    assert_eq!(body["total_quantity"], 0);
}

#[tokio::test]
async fn test_per_user_limit_blocks_add() {
    let app = setup(0, -Duration::hours(1));

    add_tickets(&app, "s1", 3).await;
    let (status, body) = add_tickets(&app, "s1", 2).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "LIMIT_REACHED");
    let (_, cart) = send(&app, "GET", "/v1/cart", Some("s1"), None).await;
    assert_eq!(cart["total_quantity"], 3);
}

#[tokio::test]
async fn test_oversized_add_cannot_wrap_past_limits() {
    let app = setup(0, -Duration::hours(1));
    add_tickets(&app, "s1", 1).await;

    let (status, body) = add_tickets(&app, "s1", u32::MAX).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "LIMIT_REACHED");
    let (_, cart) = send(&app, "GET", "/v1/cart", Some("s1"), None).await;
    assert_eq!(cart["total_quantity"], 1);
    assert_eq!(cart["items"][0]["quantity"], 1);
}

#[tokio::test]
async fn test_set_quantity_and_remove() {
    let app = setup(0, -Duration::hours(1));
    add_tickets(&app, "s1", 1).await;
    let uri = format!("/v1/cart/items/{}", app.ticket.id);

    let (status, body) = send(
        &app,
        "PUT",
        &uri,
        Some("s1"),
        Some(json!({ "event_id": app.event.id, "quantity": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_quantity"], 3);

    let (status, body) = send(&app, "DELETE", &uri, Some("s1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event_id"], Value::Null);
}

#[tokio::test]
async fn test_missing_session_header_is_rejected() {
    let app = setup(0, -Duration::hours(1));

    let (status, body) = send(&app, "GET", "/v1/cart", None, None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "MISSING_SESSION");
}

#[tokio::test]
async fn test_wallet_checkout_completes_and_empties_cart() {
    let app = setup(1_000_000, -Duration::hours(1));
    add_tickets(&app, "s1", 2).await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/checkout",
        Some("s1"),
        Some(json!({ "payment_method": "WALLET" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(app.backend.balance(), 500_000);

    let (_, cart) = send(&app, "GET", "/v1/cart", Some("s1"), None).await;
    assert_eq!(cart["total_quantity"], 0);
}

#[tokio::test]
async fn test_checkout_before_sale_opens_is_refused() {
    let app = setup(1_000_000, Duration::hours(2));
    add_tickets(&app, "s1", 1).await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/checkout",
        Some("s1"),
        Some(json!({ "payment_method": "WALLET" })),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "SALE_NOT_OPEN");
    assert_eq!(app.backend.calls().create_order, 0);
}

#[tokio::test]
async fn test_gateway_round_trip_settles_once() {
    let app = setup(0, -Duration::hours(1));
    add_tickets(&app, "s1", 2).await;

    let (status, body) = send(
        &app,
        "POST",
        "/v1/checkout",
        Some("s1"),
        Some(json!({ "payment_method": "GATEWAY" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "REDIRECT_TO_GATEWAY");
    let order_id = body["order_id"].as_str().unwrap().to_string();
    assert!(body["redirect_url"].as_str().unwrap().contains("amount=500000"));

    let return_uri =
        "/v1/payments/gateway/return?vnp_Amount=500000&vnp_ResponseCode=00&vnp_TxnRef=abc";
    let (status, body) = send(&app, "GET", return_uri, Some("s1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ORDER_SETTLED");
    assert_eq!(body["order_id"], order_id);

    // Reloading the landing page must not pay again.
    let (status, body) = send(&app, "GET", return_uri, Some("s1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ALREADY_SETTLED");
    assert_eq!(app.backend.calls().wallet_debits, 1);

    let (_, cart) = send(&app, "GET", "/v1/cart", Some("s1"), None).await;
    assert_eq!(cart["total_quantity"], 0);
}

#[tokio::test]
async fn test_failed_gateway_return_points_to_order() {
    let app = setup(0, -Duration::hours(1));
    add_tickets(&app, "s1", 1).await;
    let (_, body) = send(
        &app,
        "POST",
        "/v1/checkout",
        Some("s1"),
        Some(json!({ "payment_method": "GATEWAY" })),
    )
    .await;
    let order_id = body["order_id"].clone();

    let (status, body) = send(
        &app,
        "GET",
        "/v1/payments/gateway/return?vnp_ResponseCode=24&vnp_TxnRef=abc",
        Some("s1"),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["kind"], "GATEWAY_VERIFICATION_FAILED");
    assert_eq!(body["order_id"], order_id);

    let (status, view) = send(
        &app,
        "GET",
        &format!("/v1/orders/{}", order_id.as_str().unwrap()),
        Some("s1"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["resumable"], true);
    assert_eq!(view["awaiting_gateway"], false);
}

#[tokio::test]
async fn test_top_up_without_order() {
    let app = setup(0, -Duration::hours(1));

    let (status, body) = send(
        &app,
        "GET",
        "/v1/payments/gateway/return?vnp_Amount=100000&vnp_ResponseCode=00&vnp_TxnRef=t1",
        Some("s1"),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "TOP_UP_ONLY");
    assert_eq!(app.backend.balance(), 100_000);
}

#[tokio::test]
async fn test_sale_window_reports_state() {
    let app = setup(0, Duration::minutes(30));

    let (status, body) = send(
        &app,
        "GET",
        &format!("/v1/events/{}/sale-window", app.event.id),
        None,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "WAITING");
    let until_open = body["seconds_until_open"].as_i64().unwrap();
    assert!(until_open > 1_700 && until_open <= 1_800);
}

#[tokio::test]
async fn test_countdown_stream_drops_token_of_expired_order() {
    let app = setup(0, -Duration::hours(1));
    add_tickets(&app, "s1", 1).await;
    let (_, body) = send(
        &app,
        "POST",
        "/v1/checkout",
        Some("s1"),
        Some(json!({ "payment_method": "GATEWAY" })),
    )
    .await;
    let order_id = body["order_id"].as_str().unwrap().to_string();
    app.clock.advance(Duration::minutes(11));

    let request = Request::builder()
        .uri(format!("/v1/orders/{}/countdown/stream", order_id))
        .header("x-session-id", "s1")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut frames = response.into_body().into_data_stream();
    let mut seen = String::new();
    while let Some(chunk) = frames.next().await {
        seen.push_str(std::str::from_utf8(&chunk.unwrap()).unwrap());
        if seen.contains("event: expired") {
            break;
        }
    }
    assert!(seen.contains("EXPIRED"));

    let (_, view) = send(&app, "GET", &format!("/v1/orders/{}", order_id), Some("s1"), None).await;
    assert_eq!(view["awaiting_gateway"], false);
}
