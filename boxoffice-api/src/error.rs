use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use boxoffice_cart::CartError;
use boxoffice_catalog::LimitReason;
use boxoffice_core::BackendError;
use boxoffice_order::SettlementError;
use boxoffice_store::StoreError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    MissingSession,
    NotFound(String),
    Validation(String),
    Cart(CartError),
    Limit(LimitReason),
    Backend(BackendError),
    Settlement(SettlementError),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            AppError::MissingSession => (
                StatusCode::BAD_REQUEST,
                "MISSING_SESSION",
                "x-session-id header is required".to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Cart(e) => (StatusCode::BAD_REQUEST, "CART_ERROR", e.to_string()),
            AppError::Limit(reason) => (StatusCode::CONFLICT, "LIMIT_REACHED", reason.message()),
            AppError::Backend(BackendError::NotFound(msg)) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Backend(e) => {
                tracing::error!("Backend failure: {}", e);
                (StatusCode::BAD_GATEWAY, "BACKEND_ERROR", e.message().to_string())
            }
            AppError::Settlement(e) => return settlement_response(e),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal Server Error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message, "kind": kind }))).into_response()
    }
}

fn settlement_response(err: &SettlementError) -> Response {
    let status = match err {
        SettlementError::SaleNotOpen | SettlementError::SaleEnded => StatusCode::FORBIDDEN,
        SettlementError::InvalidCart
        | SettlementError::LimitExceeded { .. }
        | SettlementError::Rejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SettlementError::SoldOut { .. } | SettlementError::AttemptInProgress => StatusCode::CONFLICT,
        SettlementError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
        SettlementError::OrderExpired { .. } => StatusCode::GONE,
        SettlementError::GatewayVerificationFailed { .. } => StatusCode::PAYMENT_REQUIRED,
        SettlementError::NetworkOrServerError { .. } => StatusCode::BAD_GATEWAY,
        SettlementError::Store(e) => {
            tracing::error!("Slot store failure: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let body = json!({
        "error": err.to_string(),
        "kind": err.kind(),
        "order_id": err.order_id(),
        "retryable": err.is_retryable(),
        "next_step": err.next_step(),
    });
    (status, Json(body)).into_response()
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        AppError::Settlement(err)
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        AppError::Cart(err)
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Backend(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Anyhow(err.into())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Anyhow(err)
    }
}
