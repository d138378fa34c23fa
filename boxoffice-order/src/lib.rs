pub mod models;
pub mod error;
pub mod pending;
pub mod expiry;
pub mod orchestrator;
pub mod settlement;

pub use error::{is_already_paid, SettlementError};
pub use expiry::{CountdownHandle, CountdownTick, OrderCountdown};
pub use models::{
    CheckoutOutcome, CheckoutPhase, Order, OrderStatusView, PendingSettlementToken,
    ReconciliationOutcome, ResolvedSettlement, TokenState, UnpaidReason, ORDER_TTL_MINUTES,
};
pub use orchestrator::{SettlementOrchestrator, SettlementRules, SettlementServices};
pub use pending::PendingSettlementStore;
