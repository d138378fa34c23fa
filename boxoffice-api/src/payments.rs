use axum::{
    extract::{RawQuery, State},
    routing::get,
    Json, Router,
};
use boxoffice_core::GatewayReturnParams;
use boxoffice_order::ReconciliationOutcome;

use crate::error::AppError;
use crate::session::SessionId;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/payments/gateway/return", get(gateway_return))
}

/// GET /v1/payments/gateway/return?<gateway params>
/// Landing point after the gateway redirect. The query is handed to the
/// backend exactly as received.
pub async fn gateway_return(
    State(state): State<AppState>,
    session: SessionId,
    RawQuery(query): RawQuery,
) -> Result<Json<ReconciliationOutcome>, AppError> {
    let params = GatewayReturnParams::from_raw(query.unwrap_or_default());
    tracing::info!("Gateway return for session {}: {:?}", session.as_str(), params);

    // Two returns for one session must not interleave.
    let _guard = state.sessions.acquire(session.as_str()).await;
    let outcome = state
        .orchestrator(session.as_str())
        .reconcile_gateway_return(&params)
        .await?;

    tracing::info!("Gateway return for session {} resolved as {}", session.as_str(), outcome.as_str());
    Ok(Json(outcome))
}
