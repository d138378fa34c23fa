use boxoffice_core::{OrderId, OrderLine, OrderStatus, PaymentMethod, RemoteOrder};
use boxoffice_shared::Masked;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minutes an unpaid order stays payable.
pub const ORDER_TTL_MINUTES: i64 = 10;

/// Client-side reference to a backend order: just what display, expiry and
/// recovery need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub event_id: Uuid,
    pub lines: Vec<OrderLine>,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Order {
    pub fn pending(
        id: OrderId,
        event_id: Uuid,
        lines: Vec<OrderLine>,
        payment_method: PaymentMethod,
        total_amount: i64,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id,
            event_id,
            lines,
            payment_method,
            status: OrderStatus::Pending,
            total_amount,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    pub fn from_remote(remote: RemoteOrder, fallback_method: PaymentMethod, ttl: Duration) -> Self {
        Self {
            id: remote.id,
            event_id: remote.event_id,
            lines: remote.lines,
            payment_method: remote.payment_method.unwrap_or(fallback_method),
            status: remote.status,
            total_amount: remote.total_amount,
            created_at: remote.created_at,
            expires_at: remote.created_at + ttl,
        }
    }

    /// Pending and inside its payment window.
    pub fn is_payable(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Pending && now < self.expires_at
    }

    /// Pending → Completed | Cancelled | Expired. Terminal states stay put.
    pub fn transition(&mut self, to: OrderStatus) -> Result<(), InvalidTransition> {
        if self.status != OrderStatus::Pending || to == OrderStatus::Pending {
            return Err(InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid order transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenState {
    Pending,
    Resolved,
}

/// Outbox record written right before the gateway redirect; the only link
/// between the order and whatever comes back from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingSettlementToken {
    pub order_id: OrderId,
    pub created_at: DateTime<Utc>,
    pub state: TokenState,
}

impl PendingSettlementToken {
    pub fn new(order_id: OrderId, created_at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            created_at,
            state: TokenState::Pending,
        }
    }
}

/// What the last resolved token turned into. Lets a repeated gateway return
/// be recognized after the pending slot is already empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedSettlement {
    pub token: PendingSettlementToken,
    pub resolved_at: DateTime<Utc>,
    pub return_fingerprint: Masked<String>,
    pub settled: bool,
    /// Set when the funds arrived but the order stayed unpaid.
    #[serde(default)]
    pub unpaid_reason: Option<UnpaidReason>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutPhase {
    Idle,
    OrderCreating,
    WalletPaying,
    GatewayRedirecting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckoutOutcome {
    Completed {
        order_id: OrderId,
    },
    /// Token is stored; the caller navigates to `redirect_url`.
    RedirectToGateway {
        order_id: OrderId,
        redirect_url: Masked<String>,
    },
}

impl CheckoutOutcome {
    pub fn order_id(&self) -> OrderId {
        match self {
            CheckoutOutcome::Completed { order_id } => *order_id,
            CheckoutOutcome::RedirectToGateway { order_id, .. } => *order_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "message", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnpaidReason {
    Expired,
    PaymentFailed(String),
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReconciliationOutcome {
    OrderSettled {
        order_id: OrderId,
    },
    /// The order had been paid by an earlier return or attempt; nothing was
    /// debited this time.
    AlreadySettled {
        order_id: OrderId,
    },
    /// Gateway success with no order waiting: a plain wallet top-up.
    TopUpOnly,
    /// Money reached the wallet but the order is still unpaid. The order id
    /// leads to the recovery view.
    FundsReceivedOrderUnpaid {
        order_id: OrderId,
        reason: UnpaidReason,
    },
}

impl ReconciliationOutcome {
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ReconciliationOutcome::OrderSettled { .. } | ReconciliationOutcome::AlreadySettled { .. }
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationOutcome::OrderSettled { .. } => "ORDER_SETTLED",
            ReconciliationOutcome::AlreadySettled { .. } => "ALREADY_SETTLED",
            ReconciliationOutcome::TopUpOnly => "TOP_UP_ONLY",
            ReconciliationOutcome::FundsReceivedOrderUnpaid { .. } => "FUNDS_RECEIVED_ORDER_UNPAID",
        }
    }
}

/// Everything the order-status recovery view renders.
#[derive(Debug, Clone, Serialize)]
pub struct OrderStatusView {
    pub order: Order,
    pub remaining_seconds: i64,
    pub resumable: bool,
    pub awaiting_gateway: bool,
}
