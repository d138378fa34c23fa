use boxoffice_core::{BackendError, OrderId};
use boxoffice_store::StoreError;

const SOLD_OUT_MARKERS: &[&str] = &["sold out", "out of stock", "hết vé", "het ve"];
const LIMIT_MARKERS: &[&str] = &["limit", "maximum", "giới hạn", "tối đa"];
const BALANCE_MARKERS: &[&str] = &["insufficient", "balance", "không đủ", "số dư"];
const ALREADY_PAID_MARKERS: &[&str] = &[
    "already paid",
    "already been paid",
    "already completed",
    "đã thanh toán",
    "đã được thanh toán",
];

fn mentions(message: &str, markers: &[&str]) -> bool {
    let lowered = message.to_lowercase();
    markers.iter().any(|m| lowered.contains(m))
}

/// Checkout and settlement failures. Whenever an order already exists its
/// id travels with the error so payment can be resumed.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Ticket sale has not opened yet")]
    SaleNotOpen,

    #[error("Ticket sale has ended")]
    SaleEnded,

    #[error("Cart is empty or mixes events")]
    InvalidCart,

    #[error("Tickets sold out: {message}")]
    SoldOut { message: String },

    #[error("Ticket limit exceeded: {message}")]
    LimitExceeded {
        field: Option<String>,
        message: String,
    },

    #[error("Order rejected: {message}")]
    Rejected {
        field: Option<String>,
        message: String,
    },

    #[error("Insufficient wallet balance: {message}")]
    InsufficientBalance {
        order_id: Option<OrderId>,
        message: String,
    },

    #[error("Order {order_id} has expired")]
    OrderExpired { order_id: OrderId },

    #[error("Gateway payment failed: {message}")]
    GatewayVerificationFailed {
        code: Option<String>,
        message: String,
        resumable_order: Option<OrderId>,
    },

    #[error("{message}")]
    NetworkOrServerError {
        order_id: Option<OrderId>,
        message: String,
    },

    #[error("Checkout already in progress")]
    AttemptInProgress,

    #[error("Storage failure: {0}")]
    Store(#[from] StoreError),
}

impl SettlementError {
    /// Classify a failed order creation. Known wording is mapped onto the
    /// taxonomy; anything else keeps the backend's text.
    pub fn from_order_creation(err: BackendError) -> Self {
        match err {
            BackendError::Conflict(message) => SettlementError::SoldOut { message },
            BackendError::ValidationFailed { field, message } => {
                if mentions(&message, SOLD_OUT_MARKERS) {
                    SettlementError::SoldOut { message }
                } else if mentions(&message, LIMIT_MARKERS) {
                    SettlementError::LimitExceeded { field, message }
                } else {
                    SettlementError::Rejected { field, message }
                }
            }
            BackendError::InsufficientFunds(message) => SettlementError::InsufficientBalance {
                order_id: None,
                message,
            },
            other => {
                if mentions(other.message(), SOLD_OUT_MARKERS) {
                    return SettlementError::SoldOut {
                        message: other.message().to_string(),
                    };
                }
                SettlementError::NetworkOrServerError {
                    order_id: None,
                    message: other.message().to_string(),
                }
            }
        }
    }

    /// Classify a failed payment step for an order that already exists.
    pub fn from_payment(order_id: OrderId, err: BackendError) -> Self {
        match err {
            BackendError::InsufficientFunds(message) => SettlementError::InsufficientBalance {
                order_id: Some(order_id),
                message,
            },
            other if mentions(other.message(), BALANCE_MARKERS) => {
                SettlementError::InsufficientBalance {
                    order_id: Some(order_id),
                    message: other.message().to_string(),
                }
            }
            other => SettlementError::NetworkOrServerError {
                order_id: Some(order_id),
                message: other.message().to_string(),
            },
        }
    }

    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            SettlementError::InsufficientBalance { order_id, .. }
            | SettlementError::NetworkOrServerError { order_id, .. } => *order_id,
            SettlementError::OrderExpired { order_id } => Some(*order_id),
            SettlementError::GatewayVerificationFailed { resumable_order, .. } => *resumable_order,
            _ => None,
        }
    }

    /// Worth another try by the user without changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SettlementError::NetworkOrServerError { .. } | SettlementError::Store(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SettlementError::SaleNotOpen => "SALE_NOT_OPEN",
            SettlementError::SaleEnded => "SALE_ENDED",
            SettlementError::InvalidCart => "INVALID_CART",
            SettlementError::SoldOut { .. } => "SOLD_OUT",
            SettlementError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            SettlementError::Rejected { .. } => "REJECTED",
            SettlementError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            SettlementError::OrderExpired { .. } => "ORDER_EXPIRED",
            SettlementError::GatewayVerificationFailed { .. } => "GATEWAY_VERIFICATION_FAILED",
            SettlementError::NetworkOrServerError { .. } => "NETWORK_OR_SERVER_ERROR",
            SettlementError::AttemptInProgress => "ATTEMPT_IN_PROGRESS",
            SettlementError::Store(_) => "STORAGE_ERROR",
        }
    }

    /// What the user should do next.
    pub fn next_step(&self) -> &'static str {
        match self {
            SettlementError::SaleNotOpen | SettlementError::SaleEnded => "Check the event page for sale times",
            SettlementError::InvalidCart => "Pick your tickets again",
            SettlementError::SoldOut { .. } => "Return to the event page and choose other tickets",
            SettlementError::LimitExceeded { .. } => "Reduce the number of tickets and try again",
            SettlementError::Rejected { .. } => "Review your selection and try again",
            SettlementError::InsufficientBalance { order_id: Some(_), .. } => {
                "Pay this order through the payment gateway instead"
            }
            SettlementError::InsufficientBalance { order_id: None, .. } => {
                "Top up your wallet or choose the payment gateway"
            }
            SettlementError::OrderExpired { .. } => "Go back to checkout and confirm your tickets again",
            SettlementError::GatewayVerificationFailed { resumable_order: Some(_), .. } => {
                "Resume payment for your pending order"
            }
            SettlementError::GatewayVerificationFailed { resumable_order: None, .. } => {
                "Try the payment again"
            }
            SettlementError::NetworkOrServerError { order_id: Some(_), .. } => {
                "Open the order status page to retry payment"
            }
            SettlementError::NetworkOrServerError { order_id: None, .. }
            | SettlementError::Store(_) => "Try again in a moment",
            SettlementError::AttemptInProgress => "Wait for the current checkout to finish",
        }
    }
}

/// Did the backend refuse a payment because the order is already paid?
/// The structured code is authoritative; wording is a fallback for backends
/// that only send free text.
pub fn is_already_paid(err: &BackendError) -> bool {
    match err {
        BackendError::AlreadyPaid(_) => true,
        BackendError::InsufficientFunds(_) | BackendError::Unavailable(_) => false,
        other => mentions(other.message(), ALREADY_PAID_MARKERS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_conflict_is_sold_out() {
        let err = SettlementError::from_order_creation(BackendError::Conflict("Hết vé".into()));
        assert!(matches!(err, SettlementError::SoldOut { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validation_surfaces_first_message() {
        let err = SettlementError::from_order_creation(BackendError::ValidationFailed {
            field: Some("quantity".into()),
            message: "Vượt quá số vé tối đa cho mỗi người".into(),
        });
        match err {
            SettlementError::LimitExceeded { field, message } => {
                assert_eq!(field.as_deref(), Some("quantity"));
                assert_eq!(message, "Vượt quá số vé tối đa cho mỗi người");
            }
            other => panic!("unexpected {:?}", other),
        }

        let err = SettlementError::from_order_creation(BackendError::ValidationFailed {
            field: Some("event_id".into()),
            message: "The event id field is required.".into(),
        });
        assert!(matches!(err, SettlementError::Rejected { .. }));
    }

    #[test]
    fn test_network_failure_is_retryable_without_order() {
        let err = SettlementError::from_order_creation(BackendError::Unavailable("timed out".into()));
        assert!(err.is_retryable());
        assert_eq!(err.order_id(), None);
        assert_eq!(err.kind(), "NETWORK_OR_SERVER_ERROR");
    }

    #[test]
    fn test_payment_errors_keep_order_id() {
        let order_id = Uuid::new_v4();
        let err = SettlementError::from_payment(order_id, BackendError::InsufficientFunds("low".into()));
        assert_eq!(err.order_id(), Some(order_id));
        assert_eq!(err.next_step(), "Pay this order through the payment gateway instead");

        let err = SettlementError::from_payment(
            order_id,
            BackendError::Server { status: 500, message: "Số dư ví không đủ".into() },
        );
        assert!(matches!(err, SettlementError::InsufficientBalance { .. }));

        let err = SettlementError::from_payment(order_id, BackendError::Unavailable("reset".into()));
        assert_eq!(err.order_id(), Some(order_id));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_already_paid_detection() {
        assert!(is_already_paid(&BackendError::AlreadyPaid("x".into())));
        assert!(is_already_paid(&BackendError::Server {
            status: 400,
            message: "Đơn hàng đã được thanh toán".into(),
        }));
        assert!(is_already_paid(&BackendError::ValidationFailed {
            field: None,
            message: "Order already paid".into(),
        }));
        // "đã" on its own says nothing about payment.
        assert!(!is_already_paid(&BackendError::Server {
            status: 500,
            message: "Đã xảy ra lỗi".into(),
        }));
        assert!(!is_already_paid(&BackendError::InsufficientFunds("already short".into())));
    }
}
