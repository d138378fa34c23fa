use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use boxoffice_catalog::{SaleWindow, SaleWindowState};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SaleWindowResponse {
    pub event_id: Uuid,
    pub state: SaleWindowState,
    pub seconds_until_open: Option<i64>,
    pub seconds_until_close: Option<i64>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/events/{event_id}/sale-window", get(get_sale_window))
        .route("/v1/events/{event_id}/sale-window/stream", get(stream_sale_window))
}

/// GET /v1/events/{event_id}/sale-window
pub async fn get_sale_window(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<SaleWindowResponse>, AppError> {
    let catalog = state.catalog.get_event_catalog(event_id).await?;
    let current = state.sale_windows.state(&catalog.event).await;

    let now = state.clock().now();
    let window = SaleWindow::for_event(&catalog.event, now);

    Ok(Json(SaleWindowResponse {
        event_id,
        state: current,
        seconds_until_open: window.time_until_open(now).map(|d| d.num_seconds()),
        seconds_until_close: window.time_until_close(now).map(|d| d.num_seconds()),
    }))
}

/// GET /v1/events/{event_id}/sale-window/stream
pub async fn stream_sale_window(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let catalog = state.catalog.get_event_catalog(event_id).await?;
    let rx = state.sale_windows.subscribe(&catalog.event).await;

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.event_id == event_id => Some(Ok::<_, Infallible>(Event::default()
                .event("sale_window_changed")
                .data(serde_json::to_string(&event).unwrap_or_default()))),
            _ => None,
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
