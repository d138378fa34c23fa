pub mod backend;
pub mod clock;

pub use backend::{
    CreateOrderRequest, GatewayBackend, GatewayReturnParams, GatewayVerification, OrderBackend,
    OrderId, OrderLine, OrderStatus, PaymentMethod, RemoteOrder, WalletBackend,
};
pub use clock::{Clock, ManualClock, SystemClock};

/// Failures reported by the remote ticketing backend, already sorted by the
/// transport layer into the shapes the settlement core reacts to.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Validation failed: {message}")]
    ValidationFailed {
        field: Option<String>,
        message: String,
    },
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("Order already paid: {0}")]
    AlreadyPaid(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Backend error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Malformed backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Raw text carried by the backend, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            BackendError::Conflict(msg)
            | BackendError::InsufficientFunds(msg)
            | BackendError::AlreadyPaid(msg)
            | BackendError::NotFound(msg)
            | BackendError::Unauthorized(msg)
            | BackendError::Unavailable(msg)
            | BackendError::Decode(msg) => msg,
            BackendError::ValidationFailed { message, .. } => message,
            BackendError::Server { message, .. } => message,
        }
    }

    /// Transport-level failures the user may retry by hand.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
            || matches!(self, BackendError::Server { status, .. } if *status >= 500)
    }
}

pub type BackendResult<T> = Result<T, BackendError>;
