use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use boxoffice_catalog::{
    CatalogBackend, Event, LimitEnforcer, SaleWindow, SaleWindowHandle, SaleWindowState,
};
use chrono::{DateTime, Utc};
use boxoffice_cart::CartRepository;
use boxoffice_core::Clock;
use boxoffice_order::{SettlementOrchestrator, SettlementRules, SettlementServices};
use boxoffice_store::app_config::{BackendMode, CheckoutRules, Config, StorageKind};
use boxoffice_store::{FileSlotStore, HttpBackend, MemorySlotStore, MockBackend, RedisClient, SlotStore};
use boxoffice_shared::models::events::{SaleWindowChangedEvent, SettlementEvent};
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogBackend>,
    pub settlement: SettlementServices,
    pub limits: LimitEnforcer,
    pub sale_windows: Arc<SaleWindows>,
    pub sessions: Arc<SessionLocks>,
    pub settlement_tx: broadcast::Sender<SettlementEvent>,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn CatalogBackend>,
        settlement: SettlementServices,
        rules: &CheckoutRules,
    ) -> Self {
        let (settlement_tx, _) = broadcast::channel(100);
        let settlement = settlement
            .with_rules(SettlementRules {
                order_ttl: chrono::Duration::seconds(rules.order_ttl_seconds as i64),
                gateway_success_code: rules.gateway_success_code.clone(),
            })
            .with_events(settlement_tx.clone());
        let sale_windows = SaleWindows::new(
            settlement.clock.clone(),
            Duration::from_millis(rules.sale_tick_millis),
        );

        Self {
            catalog,
            settlement,
            limits: LimitEnforcer::new(rules.per_type_cap),
            sale_windows: Arc::new(sale_windows),
            sessions: Arc::new(SessionLocks::new()),
            settlement_tx,
        }
    }

    /// Wire backends and slot storage the way the configuration says.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let slots: Arc<dyn SlotStore> = match config.storage.kind {
            StorageKind::Memory => Arc::new(MemorySlotStore::new()),
            StorageKind::File => Arc::new(FileSlotStore::open(&config.storage.dir).await?),
            StorageKind::Redis => {
                let mut client = RedisClient::new(&config.redis.url).await?;
                if let Some(ttl) = config.storage.slot_ttl_seconds {
                    client = client.with_slot_ttl(ttl);
                }
                Arc::new(client)
            }
        };
        tracing::info!("Slot storage: {:?}", config.storage.kind);

        let state = match config.backend.mode {
            BackendMode::Http => {
                let backend = Arc::new(HttpBackend::new(
                    &config.backend,
                    &config.checkout.gateway_return_url,
                )?);
                let services = SettlementServices::from_backend(backend.clone(), slots);
                Self::new(backend, services, &config.checkout)
            }
            BackendMode::Mock => {
                tracing::warn!("Running against the in-process mock backend");
                let backend = Arc::new(MockBackend::new());
                let services = SettlementServices::from_backend(backend.clone(), slots);
                Self::new(backend, services, &config.checkout)
            }
        };
        Ok(state)
    }

    pub fn carts(&self) -> &CartRepository {
        &self.settlement.carts
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.settlement.clock
    }

    pub fn orchestrator(&self, session_id: &str) -> SettlementOrchestrator {
        SettlementOrchestrator::new(self.settlement.clone(), session_id)
    }
}

/// Logs settlement progress until the channel closes. Returns how many
/// events were logged.
pub async fn log_settlement_events(mut rx: broadcast::Receiver<SettlementEvent>) -> usize {
    let mut logged = 0;
    loop {
        match rx.recv().await {
            Ok(event) => {
                tracing::info!(
                    "Settlement event: order {:?} -> {} (amount {:?})",
                    event.order_id,
                    event.outcome,
                    event.amount
                );
                logged += 1;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Settlement log fell behind; {} events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => return logged,
        }
    }
}

/// A running ticker and the sale times it was started with.
struct TrackedWindow {
    sale_start_time: DateTime<Utc>,
    sale_end_time: Option<DateTime<Utc>>,
    handle: SaleWindowHandle,
}

impl TrackedWindow {
    fn matches(&self, event: &Event) -> bool {
        self.sale_start_time == event.sale_start_time && self.sale_end_time == event.sale_end_time
    }
}

/// One sale-window ticker per event, started on first use and restarted
/// when the catalog moves the sale times.
pub struct SaleWindows {
    clock: Arc<dyn Clock>,
    period: Duration,
    handles: Mutex<HashMap<Uuid, TrackedWindow>>,
}

impl SaleWindows {
    pub fn new(clock: Arc<dyn Clock>, period: Duration) -> Self {
        Self {
            clock,
            period,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub async fn state(&self, event: &Event) -> SaleWindowState {
        let mut handles = self.handles.lock().await;
        self.handle_for(&mut handles, event).current()
    }

    pub async fn subscribe(&self, event: &Event) -> broadcast::Receiver<SaleWindowChangedEvent> {
        let mut handles = self.handles.lock().await;
        self.handle_for(&mut handles, event).subscribe()
    }

    fn handle_for<'a>(
        &self,
        handles: &'a mut HashMap<Uuid, TrackedWindow>,
        event: &Event,
    ) -> &'a SaleWindowHandle {
        if handles.get(&event.id).is_some_and(|w| !w.matches(event)) {
            tracing::info!("Sale times for event {} changed; restarting ticker", event.id);
            handles.remove(&event.id);
        }
        let tracked = handles.entry(event.id).or_insert_with(|| {
            tracing::debug!("Starting sale window ticker for event {}", event.id);
            TrackedWindow {
                sale_start_time: event.sale_start_time,
                sale_end_time: event.sale_end_time,
                handle: SaleWindow::for_event(event, self.clock.now())
                    .spawn_ticker(self.clock.clone(), self.period),
            }
        });
        &tracked.handle
    }
}

/// Serializes cart, checkout and reconciliation work within one session.
#[derive(Default)]
pub struct SessionLocks {
    locks: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Held or awaited locks have clones outside the map.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
