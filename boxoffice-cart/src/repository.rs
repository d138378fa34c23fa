use boxoffice_store::slot::{read_json, write_json};
use boxoffice_store::{SlotKey, SlotStore, StoreError};
use std::sync::Arc;
use tracing::warn;

use crate::cart::BookingCart;

/// Saves and restores cart snapshots so a selection survives reloads within
/// one session.
#[derive(Clone)]
pub struct CartRepository {
    store: Arc<dyn SlotStore>,
}

impl CartRepository {
    pub fn new(store: Arc<dyn SlotStore>) -> Self {
        Self { store }
    }

    /// A missing, unreadable or inconsistent snapshot yields an empty cart.
    pub async fn load(&self, session_id: &str) -> Result<BookingCart, StoreError> {
        let slot = SlotKey::cart(session_id);
        match read_json::<BookingCart>(self.store.as_ref(), &slot).await {
            Ok(Some(cart)) if cart.is_consistent() => Ok(cart),
            Ok(Some(_)) => {
                warn!("Discarding inconsistent cart snapshot for session {}", session_id);
                self.store.clear(&slot).await?;
                Ok(BookingCart::new())
            }
            Ok(None) => Ok(BookingCart::new()),
            Err(StoreError::Serialize(e)) => {
                warn!("Discarding unreadable cart snapshot for session {}: {}", session_id, e);
                self.store.clear(&slot).await?;
                Ok(BookingCart::new())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn save(&self, session_id: &str, cart: &BookingCart) -> Result<(), StoreError> {
        let slot = SlotKey::cart(session_id);
        if cart.is_empty() {
            self.store.clear(&slot).await?;
            return Ok(());
        }
        write_json(self.store.as_ref(), &slot, cart).await
    }

    pub async fn discard(&self, session_id: &str) -> Result<(), StoreError> {
        self.store.clear(&SlotKey::cart(session_id)).await?;
        Ok(())
    }
}
