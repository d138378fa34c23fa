use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::BackendResult;

pub type OrderId = Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[serde(alias = "wallet")]
    Wallet,
    #[serde(alias = "gateway", alias = "VNPAY", alias = "vnpay")]
    Gateway,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Wallet => "WALLET",
            PaymentMethod::Gateway => "GATEWAY",
        }
    }
}

/// Order status as reported by the backend. Several spellings are in the
/// wild, so each variant accepts the common aliases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[serde(alias = "pending", alias = "PAYMENT_PENDING")]
    Pending,
    #[serde(alias = "completed", alias = "PAID", alias = "paid")]
    Completed,
    #[serde(alias = "cancelled", alias = "CANCELED", alias = "canceled")]
    Cancelled,
    #[serde(alias = "expired")]
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderLine {
    pub ticket_type_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub event_id: Uuid,
    pub lines: Vec<OrderLine>,
    pub payment_method: PaymentMethod,
}

/// Backend view of an order, used for recovery and expiry screens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteOrder {
    pub id: OrderId,
    pub event_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub lines: Vec<OrderLine>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

/// Query string the gateway appended to its return redirect, kept exactly as
/// received. Nothing in the client parses it; only the backend's verdict on
/// it is trusted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayReturnParams {
    raw_query: String,
}

impl GatewayReturnParams {
    pub fn from_raw(raw_query: impl Into<String>) -> Self {
        let raw_query = raw_query.into();
        let raw_query = raw_query.strip_prefix('?').map(str::to_string).unwrap_or(raw_query);
        Self { raw_query }
    }

    pub fn raw_query(&self) -> &str {
        &self.raw_query
    }

    pub fn is_empty(&self) -> bool {
        self.raw_query.is_empty()
    }
}

impl std::fmt::Debug for GatewayReturnParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayReturnParams")
            .field("raw_query", &boxoffice_shared::Masked(&self.raw_query))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayVerification {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl GatewayVerification {
    pub fn is_success(&self, success_code: &str) -> bool {
        self.code == success_code
    }
}

#[async_trait]
pub trait OrderBackend: Send + Sync {
    /// Create a pending order. Inventory and per-user caps are enforced here.
    async fn create_order(&self, request: &CreateOrderRequest) -> BackendResult<OrderId>;

    async fn get_order(&self, order_id: OrderId) -> BackendResult<RemoteOrder>;
}

#[async_trait]
pub trait WalletBackend: Send + Sync {
    async fn pay_order_with_wallet(&self, order_id: OrderId) -> BackendResult<()>;

    /// Advisory only; the debit itself is checked server-side.
    async fn get_wallet_balance(&self) -> BackendResult<i64>;
}

#[async_trait]
pub trait GatewayBackend: Send + Sync {
    /// Ask the backend for a gateway URL that tops the wallet up by `amount`.
    async fn create_gateway_top_up_link(&self, amount: i64) -> BackendResult<String>;

    /// Hand the untouched return query to the backend, which checks the
    /// gateway signature with a secret the client never holds.
    async fn verify_gateway_return(
        &self,
        params: &GatewayReturnParams,
    ) -> BackendResult<GatewayVerification>;
}
