use async_trait::async_trait;
use boxoffice_catalog::{CatalogBackend, EventCatalog};
use boxoffice_core::{
    BackendError, BackendResult, Clock, CreateOrderRequest, GatewayBackend, GatewayReturnParams,
    GatewayVerification, OrderBackend, OrderId, OrderStatus, RemoteOrder, SystemClock,
    WalletBackend,
};
use chrono::Duration;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;
use uuid::Uuid;

/// In-process stand-in for the ticketing backend. Keeps orders, a wallet and
/// inventory, counts every call, and lets tests queue failures.
pub struct MockBackend {
    state: Mutex<MockState>,
    clock: Arc<dyn Clock>,
    order_ttl: Duration,
}

#[derive(Default)]
struct MockState {
    catalogs: HashMap<Uuid, EventCatalog>,
    orders: HashMap<OrderId, RemoteOrder>,
    balance: i64,
    pending_top_up: Option<i64>,
    credited_returns: HashSet<String>,
    create_order_failures: VecDeque<BackendError>,
    payment_failures: VecDeque<BackendError>,
    link_failures: VecDeque<BackendError>,
    verification_failures: VecDeque<BackendError>,
    calls: MockCalls,
}

/// How often each backend operation was invoked.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MockCalls {
    pub create_order: usize,
    pub get_order: usize,
    pub pay_order_with_wallet: usize,
    pub wallet_debits: usize,
    pub get_wallet_balance: usize,
    pub create_top_up_link: usize,
    pub verify_gateway_return: usize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            clock: Arc::new(SystemClock),
            order_ttl: Duration::minutes(10),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_catalog(&self, catalog: EventCatalog) {
        self.lock().catalogs.insert(catalog.event.id, catalog);
    }

    pub fn set_balance(&self, balance: i64) {
        self.lock().balance = balance;
    }

    pub fn balance(&self) -> i64 {
        self.lock().balance
    }

    pub fn calls(&self) -> MockCalls {
        self.lock().calls
    }

    pub fn order(&self, order_id: OrderId) -> Option<RemoteOrder> {
        self.lock().orders.get(&order_id).cloned()
    }

    pub fn set_order_status(&self, order_id: OrderId, status: OrderStatus) {
        if let Some(order) = self.lock().orders.get_mut(&order_id) {
            order.status = status;
        }
    }

    pub fn fail_next_create_order(&self, err: BackendError) {
        self.lock().create_order_failures.push_back(err);
    }

    pub fn fail_next_payment(&self, err: BackendError) {
        self.lock().payment_failures.push_back(err);
    }

    pub fn fail_next_link(&self, err: BackendError) {
        self.lock().link_failures.push_back(err);
    }

    pub fn fail_next_verification(&self, err: BackendError) {
        self.lock().verification_failures.push_back(err);
    }

    fn refresh_expiry(&self, order: &mut RemoteOrder) {
        if order.status == OrderStatus::Pending && self.clock.now() > order.created_at + self.order_ttl {
            order.status = OrderStatus::Expired;
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn query_value<'a>(raw_query: &'a str, key: &str) -> Option<&'a str> {
    raw_query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v)
}

#[async_trait]
impl OrderBackend for MockBackend {
    async fn create_order(&self, request: &CreateOrderRequest) -> BackendResult<OrderId> {
        let mut state = self.lock();
        state.calls.create_order += 1;
        if let Some(err) = state.create_order_failures.pop_front() {
            return Err(err);
        }
        if request.lines.is_empty() {
            return Err(BackendError::ValidationFailed {
                field: Some("lines".to_string()),
                message: "Order must contain at least one ticket".to_string(),
            });
        }

        let mut total = 0;
        if let Some(catalog) = state.catalogs.get_mut(&request.event_id) {
            // Check every line before reserving any of them.
            for line in &request.lines {
                let ticket = catalog
                    .ticket_type(line.ticket_type_id)
                    .ok_or_else(|| BackendError::ValidationFailed {
                        field: Some("ticket_type_id".to_string()),
                        message: format!("Unknown ticket type {}", line.ticket_type_id),
                    })?;
                if ticket.available_quantity < line.quantity {
                    return Err(BackendError::Conflict(format!("{} is sold out", ticket.name)));
                }
            }
            for line in &request.lines {
                if let Some(ticket) = catalog.ticket_types.iter_mut().find(|t| t.id == line.ticket_type_id) {
                    ticket.available_quantity -= line.quantity;
                    total += ticket.price * i64::from(line.quantity);
                }
            }
        }

        let order = RemoteOrder {
            id: Uuid::new_v4(),
            event_id: request.event_id,
            status: OrderStatus::Pending,
            total_amount: total,
            created_at: self.clock.now(),
            lines: request.lines.clone(),
            payment_method: Some(request.payment_method),
        };
        let id = order.id;
        state.orders.insert(id, order);
        info!("Mock order {} created, total {}", id, total);
        Ok(id)
    }

    async fn get_order(&self, order_id: OrderId) -> BackendResult<RemoteOrder> {
        let mut state = self.lock();
        state.calls.get_order += 1;
        let mut order = state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("Order {} not found", order_id)))?;
        self.refresh_expiry(&mut order);
        state.orders.insert(order_id, order.clone());
        Ok(order)
    }
}

#[async_trait]
impl WalletBackend for MockBackend {
    async fn pay_order_with_wallet(&self, order_id: OrderId) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.pay_order_with_wallet += 1;
        if let Some(err) = state.payment_failures.pop_front() {
            return Err(err);
        }

        let mut order = state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("Order {} not found", order_id)))?;
        self.refresh_expiry(&mut order);

        match order.status {
            OrderStatus::Completed => {
                return Err(BackendError::AlreadyPaid(format!("Order {} already paid", order_id)))
            }
            OrderStatus::Expired | OrderStatus::Cancelled => {
                return Err(BackendError::ValidationFailed {
                    field: None,
                    message: format!("Order {} is no longer payable", order_id),
                })
            }
            OrderStatus::Pending => {}
        }

        if state.balance < order.total_amount {
            return Err(BackendError::InsufficientFunds("Insufficient wallet balance".to_string()));
        }

        state.balance -= order.total_amount;
        state.calls.wallet_debits += 1;
        order.status = OrderStatus::Completed;
        state.orders.insert(order_id, order);
        Ok(())
    }

    async fn get_wallet_balance(&self) -> BackendResult<i64> {
        let mut state = self.lock();
        state.calls.get_wallet_balance += 1;
        Ok(state.balance)
    }
}

#[async_trait]
impl GatewayBackend for MockBackend {
    async fn create_gateway_top_up_link(&self, amount: i64) -> BackendResult<String> {
        let mut state = self.lock();
        state.calls.create_top_up_link += 1;
        if let Some(err) = state.link_failures.pop_front() {
            return Err(err);
        }
        state.pending_top_up = Some(amount);
        Ok(format!("https://gateway.mock/pay?amount={}&txn={}", amount, Uuid::new_v4().simple()))
    }

    /// Reads `vnp_ResponseCode` from the query; a success credits the last
    /// requested top-up once per distinct query.
    async fn verify_gateway_return(
        &self,
        params: &GatewayReturnParams,
    ) -> BackendResult<GatewayVerification> {
        let mut state = self.lock();
        state.calls.verify_gateway_return += 1;
        if let Some(err) = state.verification_failures.pop_front() {
            return Err(err);
        }

        let code = query_value(params.raw_query(), "vnp_ResponseCode")
            .unwrap_or("97")
            .to_string();
        if code == "00" && state.credited_returns.insert(params.raw_query().to_string()) {
            let amount = query_value(params.raw_query(), "vnp_Amount")
                .and_then(|v| v.parse::<i64>().ok())
                .or(state.pending_top_up)
                .unwrap_or(0);
            state.balance += amount;
        }

        let message = if code == "00" { "Success" } else { "Transaction failed" };
        Ok(GatewayVerification {
            code,
            message: message.to_string(),
        })
    }
}

#[async_trait]
impl CatalogBackend for MockBackend {
    async fn get_event_catalog(&self, event_id: Uuid) -> BackendResult<EventCatalog> {
        self.lock()
            .catalogs
            .get(&event_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("Event {} not found", event_id)))
    }
}
