use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub redis: RedisConfig,
    pub checkout: CheckoutRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    Http,
    Mock,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub api_token: Option<String>,
    #[serde(default = "default_backend_mode")]
    pub mode: BackendMode,
}

fn default_timeout_ms() -> u64 { 10_000 }
fn default_backend_mode() -> BackendMode { BackendMode::Http }

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    File,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub kind: StorageKind,
    #[serde(default = "default_storage_dir")]
    pub dir: String,
    pub slot_ttl_seconds: Option<u64>,
}

fn default_storage_dir() -> String { "data/slots".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CheckoutRules {
    #[serde(default = "default_order_ttl")]
    pub order_ttl_seconds: u64,
    #[serde(default = "default_per_type_cap")]
    pub per_type_cap: u32,
    #[serde(default = "default_sale_tick")]
    pub sale_tick_millis: u64,
    pub gateway_return_url: String,
    #[serde(default = "default_success_code")]
    pub gateway_success_code: String,
}

fn default_order_ttl() -> u64 { 600 }
fn default_per_type_cap() -> u32 { 10 }
fn default_sale_tick() -> u64 { 1_000 }
fn default_success_code() -> String { "00".to_string() }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `BOXOFFICE_BACKEND__BASE_URL=...` sets `backend.base_url`
            .add_source(config::Environment::with_prefix("BOXOFFICE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
