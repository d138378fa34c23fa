use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use boxoffice_core::{OrderId, OrderStatus, PaymentMethod};
use boxoffice_order::{CheckoutOutcome, CountdownTick, OrderCountdown, OrderStatusView, SettlementError};
use chrono::{DateTime, Utc};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::WatchStream;

use crate::error::AppError;
use crate::session::SessionId;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct CountdownResponse {
    pub order_id: OrderId,
    pub expires_at: DateTime<Utc>,
    pub remaining_seconds: i64,
    pub expired: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/checkout", post(checkout))
        .route("/v1/orders/{order_id}", get(order_status))
        .route("/v1/orders/{order_id}/resume", post(resume_payment))
        .route("/v1/orders/{order_id}/countdown", get(countdown))
        .route("/v1/orders/{order_id}/countdown/stream", get(countdown_stream))
}

/// POST /v1/checkout
/// Confirm the session's cart and pay by wallet, or get the gateway URL.
pub async fn checkout(
    State(state): State<AppState>,
    session: SessionId,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutOutcome>, AppError> {
    let _guard = state.sessions.acquire(session.as_str()).await;
    let mut cart = state.carts().load(session.as_str()).await?;
    let event_id = cart.event_id().ok_or(SettlementError::InvalidCart)?;

    // 1. Sale window gate
    let catalog = state.catalog.get_event_catalog(event_id).await?;
    let sale_state = state.sale_windows.state(&catalog.event).await;

    // 2. Orchestrate
    let mut orchestrator = state.orchestrator(session.as_str());
    let outcome = orchestrator
        .checkout(&mut cart, req.payment_method, sale_state)
        .await?;

    tracing::info!(
        "Checkout for session {} finished as {:?}",
        session.as_str(),
        orchestrator.phase()
    );
    Ok(Json(outcome))
}

/// GET /v1/orders/{order_id}
/// Recovery view.
pub async fn order_status(
    State(state): State<AppState>,
    session: SessionId,
    Path(order_id): Path<OrderId>,
) -> Result<Json<OrderStatusView>, AppError> {
    let view = state.orchestrator(session.as_str()).order_status(order_id).await?;
    Ok(Json(view))
}

/// POST /v1/orders/{order_id}/resume
pub async fn resume_payment(
    State(state): State<AppState>,
    session: SessionId,
    Path(order_id): Path<OrderId>,
    Json(req): Json<CheckoutRequest>,
) -> Result<Json<CheckoutOutcome>, AppError> {
    let _guard = state.sessions.acquire(session.as_str()).await;
    let outcome = state
        .orchestrator(session.as_str())
        .resume_payment(order_id, req.payment_method)
        .await?;
    Ok(Json(outcome))
}

/// GET /v1/orders/{order_id}/countdown
/// An order found past its deadline is aborted here, dropping any
/// pending token for it.
pub async fn countdown(
    State(state): State<AppState>,
    session: SessionId,
    Path(order_id): Path<OrderId>,
) -> Result<Json<CountdownResponse>, AppError> {
    let view = state.orchestrator(session.as_str()).order_status(order_id).await?;
    let countdown = OrderCountdown::for_order(&view.order);
    let now = state.clock().now();
    let expired = countdown.is_expired(now) || view.order.status == OrderStatus::Expired;

    if expired && view.awaiting_gateway {
        abort_expired(&state, session.as_str(), order_id).await;
    }

    Ok(Json(CountdownResponse {
        order_id,
        expires_at: countdown.expires_at(),
        remaining_seconds: countdown.remaining(now).num_seconds(),
        expired,
    }))
}

/// GET /v1/orders/{order_id}/countdown/stream
/// The expired tick is sent only after the order's token is dropped.
pub async fn countdown_stream(
    State(state): State<AppState>,
    session: SessionId,
    Path(order_id): Path<OrderId>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let view = state.orchestrator(session.as_str()).order_status(order_id).await?;
    let handle = OrderCountdown::for_order(&view.order)
        .watch(state.clock().clone(), Duration::from_secs(1));
    let ticks = handle.ticks();
    let session_id = session.as_str().to_string();

    let stream = WatchStream::new(ticks).then(move |tick| {
        // Keeps the timer alive for as long as the client listens.
        let _timer = &handle;
        let state = state.clone();
        let session_id = session_id.clone();
        async move {
            let name = match tick {
                CountdownTick::Remaining { .. } => "remaining",
                CountdownTick::Expired => {
                    abort_expired(&state, &session_id, order_id).await;
                    "expired"
                }
            };
            let data = serde_json::to_string(&tick).unwrap_or_default();
            Ok::<_, Infallible>(Event::default().event(name).data(data))
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Drop the order's pending token, if it still holds one.
async fn abort_expired(state: &AppState, session_id: &str, order_id: OrderId) {
    let _guard = state.sessions.acquire(session_id).await;
    let err = state.orchestrator(session_id).abort_expired(order_id).await;
    tracing::info!("{}", err);
}
