use uuid::Uuid;

/// Emitted whenever a recomputed sale window differs from the previous value.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct SaleWindowChangedEvent {
    pub event_id: Uuid,
    pub previous: String,
    pub current: String,
    pub timestamp: i64,
}

/// Progress of one checkout attempt: order creation, payment and
/// reconciliation outcomes all flow through this record.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SettlementEvent {
    pub order_id: Option<Uuid>,
    pub outcome: String,
    pub amount: Option<i64>,
    pub timestamp: i64,
}
