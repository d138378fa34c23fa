pub mod app_config;
pub mod slot;
pub mod file_store;
pub mod redis_repo;
pub mod backend_client;
pub mod mock_backend;

pub use slot::{MemorySlotStore, SlotKey, SlotStore, StoreError};
pub use file_store::FileSlotStore;
pub use redis_repo::RedisClient;
pub use backend_client::HttpBackend;
pub use mock_backend::MockBackend;
