use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::info;

use crate::slot::{SlotStore, StoreError};

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
    slot_ttl_seconds: Option<u64>,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            slot_ttl_seconds: None,
        })
    }

    /// Expire slots after `ttl_seconds` so abandoned sessions do not pile up.
    pub fn with_slot_ttl(mut self, ttl_seconds: u64) -> Self {
        self.slot_ttl_seconds = Some(ttl_seconds);
        self
    }

    fn key(slot: &str) -> String {
        format!("boxoffice:{}", slot)
    }
}

#[async_trait]
impl SlotStore for RedisClient {
    async fn read(&self, slot: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(Self::key(slot)).await?;
        Ok(value)
    }

    async fn write(&self, slot: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        match self.slot_ttl_seconds {
            Some(ttl) => conn.set_ex::<_, _, ()>(Self::key(slot), value, ttl).await?,
            None => conn.set::<_, _, ()>(Self::key(slot), value).await?,
        }
        info!("Slot written: {}", slot);
        Ok(())
    }

    async fn clear(&self, slot: &str) -> Result<bool, StoreError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let removed: i64 = conn.del(Self::key(slot)).await?;
        Ok(removed > 0)
    }
}
