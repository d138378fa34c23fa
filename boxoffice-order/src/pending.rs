use boxoffice_core::OrderId;
use boxoffice_shared::Masked;
use boxoffice_store::slot::{read_json, write_json};
use boxoffice_store::{SlotKey, SlotStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{PendingSettlementToken, ResolvedSettlement, TokenState, UnpaidReason};

/// Durable home of the pending settlement token. At most one token per
/// session; writing a new one replaces the old.
#[derive(Clone)]
pub struct PendingSettlementStore {
    store: Arc<dyn SlotStore>,
}

impl PendingSettlementStore {
    pub fn new(store: Arc<dyn SlotStore>) -> Self {
        Self { store }
    }

    /// Must complete before the caller leaves for the gateway.
    pub async fn record(
        &self,
        session_id: &str,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<PendingSettlementToken, StoreError> {
        let token = PendingSettlementToken::new(order_id, now);
        write_json(self.store.as_ref(), &SlotKey::pending_settlement(session_id), &token).await?;
        info!("Pending settlement recorded for order {}", order_id);
        Ok(token)
    }

    /// An unreadable token is dropped rather than guessed at.
    pub async fn current(&self, session_id: &str) -> Result<Option<PendingSettlementToken>, StoreError> {
        let slot = SlotKey::pending_settlement(session_id);
        match read_json::<PendingSettlementToken>(self.store.as_ref(), &slot).await {
            Ok(Some(token)) if token.state == TokenState::Pending => Ok(Some(token)),
            Ok(Some(_)) => {
                self.store.clear(&slot).await?;
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(StoreError::Serialize(e)) => {
                warn!("Dropping unreadable settlement token for session {}: {}", session_id, e);
                self.store.clear(&slot).await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Consume the token: remember how it ended, then empty the slot.
    pub async fn resolve(
        &self,
        session_id: &str,
        token: PendingSettlementToken,
        fingerprint: &str,
        settled: bool,
        now: DateTime<Utc>,
    ) -> Result<ResolvedSettlement, StoreError> {
        self.write_resolved(session_id, token, fingerprint, settled, None, now).await
    }

    /// Funds reached the wallet but the order was not paid.
    pub async fn resolve_unpaid(
        &self,
        session_id: &str,
        token: PendingSettlementToken,
        fingerprint: &str,
        reason: UnpaidReason,
        now: DateTime<Utc>,
    ) -> Result<ResolvedSettlement, StoreError> {
        self.write_resolved(session_id, token, fingerprint, false, Some(reason), now).await
    }

    async fn write_resolved(
        &self,
        session_id: &str,
        mut token: PendingSettlementToken,
        fingerprint: &str,
        settled: bool,
        unpaid_reason: Option<UnpaidReason>,
        now: DateTime<Utc>,
    ) -> Result<ResolvedSettlement, StoreError> {
        token.state = TokenState::Resolved;
        let record = ResolvedSettlement {
            token,
            resolved_at: now,
            return_fingerprint: Masked::new(fingerprint.to_string()),
            settled,
            unpaid_reason,
        };
        write_json(self.store.as_ref(), &SlotKey::resolved_settlement(session_id), &record).await?;
        self.store.clear(&SlotKey::pending_settlement(session_id)).await?;
        info!(
            "Settlement token for order {} resolved (settled: {})",
            record.token.order_id, settled
        );
        Ok(record)
    }

    pub async fn last_resolved(&self, session_id: &str) -> Result<Option<ResolvedSettlement>, StoreError> {
        match read_json(self.store.as_ref(), &SlotKey::resolved_settlement(session_id)).await {
            Err(StoreError::Serialize(_)) => Ok(None),
            other => other,
        }
    }

    /// Drop the token without resolving it (order expired, link never issued).
    pub async fn discard(&self, session_id: &str) -> Result<bool, StoreError> {
        self.store.clear(&SlotKey::pending_settlement(session_id)).await
    }
}
