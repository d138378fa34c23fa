use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A named slot holding one serialized value that outlives the process.
#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn read(&self, slot: &str) -> Result<Option<String>, StoreError>;

    async fn write(&self, slot: &str, value: &str) -> Result<(), StoreError>;

    /// Idempotent; returns whether the slot held a value.
    async fn clear(&self, slot: &str) -> Result<bool, StoreError>;
}

pub async fn read_json<T: DeserializeOwned>(
    store: &dyn SlotStore,
    slot: &str,
) -> Result<Option<T>, StoreError> {
    match store.read(slot).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub async fn write_json<T: Serialize + ?Sized>(
    store: &dyn SlotStore,
    slot: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value)?;
    store.write(slot, &raw).await
}

/// Slot names, scoped per session.
pub struct SlotKey;

impl SlotKey {
    pub fn cart(session_id: &str) -> String {
        format!("cart:{}", session_id)
    }

    pub fn pending_settlement(session_id: &str) -> String {
        format!("settlement:pending:{}", session_id)
    }

    pub fn resolved_settlement(session_id: &str) -> String {
        format!("settlement:resolved:{}", session_id)
    }
}

#[derive(Debug, Default)]
pub struct MemorySlotStore {
    slots: RwLock<HashMap<String, String>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SlotStore for MemorySlotStore {
    async fn read(&self, slot: &str) -> Result<Option<String>, StoreError> {
        Ok(self.slots.read().await.get(slot).cloned())
    }

    async fn write(&self, slot: &str, value: &str) -> Result<(), StoreError> {
        self.slots.write().await.insert(slot.to_string(), value.to_string());
        Ok(())
    }

    async fn clear(&self, slot: &str) -> Result<bool, StoreError> {
        Ok(self.slots.write().await.remove(slot).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Token {
        order_id: String,
    }

    #[tokio::test]
    async fn test_memory_slot_lifecycle() {
        let store = MemorySlotStore::new();
        let slot = SlotKey::pending_settlement("s-1");

        assert!(store.read(&slot).await.unwrap().is_none());

        write_json(&store, &slot, &Token { order_id: "o-1".into() }).await.unwrap();
        let token: Option<Token> = read_json(&store, &slot).await.unwrap();
        assert_eq!(token, Some(Token { order_id: "o-1".into() }));

        assert!(store.clear(&slot).await.unwrap());
        assert!(!store.clear(&slot).await.unwrap());
        assert!(store.read(&slot).await.unwrap().is_none());
    }

    #[test]
    fn test_slot_keys_are_session_scoped() {
        assert_eq!(SlotKey::cart("abc"), "cart:abc");
        assert_eq!(SlotKey::pending_settlement("abc"), "settlement:pending:abc");
        assert_ne!(SlotKey::resolved_settlement("a"), SlotKey::resolved_settlement("b"));
    }
}
