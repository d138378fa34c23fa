use std::sync::Arc;

use boxoffice_cart::{BookingCart, CartRepository};
use boxoffice_catalog::SaleWindowState;
use boxoffice_core::{
    Clock, CreateOrderRequest, GatewayBackend, OrderBackend, OrderId, OrderStatus, PaymentMethod,
    SystemClock, WalletBackend,
};
use boxoffice_shared::models::events::SettlementEvent;
use boxoffice_shared::Masked;
use boxoffice_store::SlotStore;
use chrono::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{is_already_paid, SettlementError};
use crate::expiry::OrderCountdown;
use crate::models::{CheckoutOutcome, CheckoutPhase, Order, OrderStatusView, ORDER_TTL_MINUTES};
use crate::pending::PendingSettlementStore;

/// Knobs that come from configuration.
#[derive(Debug, Clone)]
pub struct SettlementRules {
    pub order_ttl: Duration,
    pub gateway_success_code: String,
}

impl Default for SettlementRules {
    fn default() -> Self {
        Self {
            order_ttl: Duration::minutes(ORDER_TTL_MINUTES),
            gateway_success_code: "00".to_string(),
        }
    }
}

/// Collaborators shared by every checkout attempt.
#[derive(Clone)]
pub struct SettlementServices {
    pub orders: Arc<dyn OrderBackend>,
    pub wallet: Arc<dyn WalletBackend>,
    pub gateway: Arc<dyn GatewayBackend>,
    pub pending: PendingSettlementStore,
    pub carts: CartRepository,
    pub clock: Arc<dyn Clock>,
    pub rules: SettlementRules,
    pub events: Option<broadcast::Sender<SettlementEvent>>,
}

impl SettlementServices {
    pub fn new(
        orders: Arc<dyn OrderBackend>,
        wallet: Arc<dyn WalletBackend>,
        gateway: Arc<dyn GatewayBackend>,
        slots: Arc<dyn SlotStore>,
    ) -> Self {
        Self {
            orders,
            wallet,
            gateway,
            pending: PendingSettlementStore::new(slots.clone()),
            carts: CartRepository::new(slots),
            clock: Arc::new(SystemClock),
            rules: SettlementRules::default(),
            events: None,
        }
    }

    /// One backend serving orders, wallet and gateway.
    pub fn from_backend<B>(backend: Arc<B>, slots: Arc<dyn SlotStore>) -> Self
    where
        B: OrderBackend + WalletBackend + GatewayBackend + 'static,
    {
        Self::new(backend.clone(), backend.clone(), backend, slots)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_rules(mut self, rules: SettlementRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<SettlementEvent>) -> Self {
        self.events = Some(events);
        self
    }
}

/// Drives one session's checkout: order creation, the payment branch, and
/// (in `settlement`) reconciliation of the gateway return. Cheap to build;
/// one instance per attempt.
pub struct SettlementOrchestrator {
    pub(crate) services: SettlementServices,
    pub(crate) session_id: String,
    phase: CheckoutPhase,
    order: Option<Order>,
}

impl SettlementOrchestrator {
    pub fn new(services: SettlementServices, session_id: impl Into<String>) -> Self {
        Self {
            services,
            session_id: session_id.into(),
            phase: CheckoutPhase::Idle,
            order: None,
        }
    }

    pub fn phase(&self) -> CheckoutPhase {
        self.phase
    }

    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub(crate) fn set_phase(&mut self, phase: CheckoutPhase) {
        if self.phase != phase {
            info!(
                "Checkout for session {}: {:?} -> {:?}",
                self.session_id, self.phase, phase
            );
            self.phase = phase;
        }
    }

    pub(crate) fn emit(&self, order_id: Option<OrderId>, outcome: &str, amount: Option<i64>) {
        if let Some(events) = &self.services.events {
            // Nobody listening is fine.
            let _ = events.send(SettlementEvent {
                order_id,
                outcome: outcome.to_string(),
                amount,
                timestamp: self.services.clock.now().timestamp(),
            });
        }
    }

    fn fail(&mut self, err: SettlementError) -> SettlementError {
        self.set_phase(CheckoutPhase::Failed);
        warn!("Checkout for session {} failed: {}", self.session_id, err);
        self.emit(err.order_id(), err.kind(), None);
        err
    }

    /// Confirm the cart: create the order, then pay from the wallet or hand
    /// off to the gateway.
    pub async fn checkout(
        &mut self,
        cart: &mut BookingCart,
        method: PaymentMethod,
        sale_state: SaleWindowState,
    ) -> Result<CheckoutOutcome, SettlementError> {
        if !matches!(self.phase, CheckoutPhase::Idle | CheckoutPhase::Failed) {
            return Err(SettlementError::AttemptInProgress);
        }

        // 1. Gates
        match sale_state {
            SaleWindowState::Waiting => return Err(SettlementError::SaleNotOpen),
            SaleWindowState::Ended => return Err(SettlementError::SaleEnded),
            SaleWindowState::Open => {}
        }
        let event_id = match cart.event_id() {
            Some(event_id) if cart.is_valid() => event_id,
            _ => return Err(SettlementError::InvalidCart),
        };
        let total = cart.total_amount();

        // 2. Advisory balance check; the pay call has the final word
        if method == PaymentMethod::Wallet {
            match self.services.wallet.get_wallet_balance().await {
                Ok(balance) if balance < total => {
                    return Err(SettlementError::InsufficientBalance {
                        order_id: None,
                        message: format!("Wallet balance {} is below the order total {}", balance, total),
                    });
                }
                Ok(_) => {}
                Err(e) => warn!("Balance check skipped: {}", e),
            }
        }

        // 3. Create the order
        self.set_phase(CheckoutPhase::OrderCreating);
        let request = CreateOrderRequest {
            event_id,
            lines: cart.order_lines(),
            payment_method: method,
        };
        let order_id = match self.services.orders.create_order(&request).await {
            Ok(id) => id,
            Err(e) => return Err(self.fail(SettlementError::from_order_creation(e))),
        };
        info!("Order {} created for event {} ({} {})", order_id, event_id, total, method.as_str());

        self.order = Some(Order::pending(
            order_id,
            event_id,
            request.lines,
            method,
            total,
            self.services.clock.now(),
            self.services.rules.order_ttl,
        ));
        self.emit(Some(order_id), "ORDER_CREATED", Some(total));

        // 4. Pay
        match method {
            PaymentMethod::Wallet => {
                let outcome = self.pay_with_wallet(order_id).await?;
                cart.clear();
                self.persist_cart(cart).await;
                Ok(outcome)
            }
            PaymentMethod::Gateway => self.redirect_to_gateway(order_id, total).await,
        }
    }

    /// Second attempt at paying an order that already exists, e.g. from the
    /// order-status view after a failed gateway return.
    pub async fn resume_payment(
        &mut self,
        order_id: OrderId,
        method: PaymentMethod,
    ) -> Result<CheckoutOutcome, SettlementError> {
        let remote = match self.services.orders.get_order(order_id).await {
            Ok(remote) => remote,
            Err(e) => return Err(self.fail(SettlementError::from_payment(order_id, e))),
        };
        let order = Order::from_remote(remote, method, self.services.rules.order_ttl);
        let now = self.services.clock.now();
        let event_id = order.event_id;
        let total = order.total_amount;
        let status = order.status;
        let payable = order.is_payable(now);
        self.order = Some(order);

        if status == OrderStatus::Completed {
            self.set_phase(CheckoutPhase::Completed);
            self.clear_cart_for(Some(event_id)).await;
            return Ok(CheckoutOutcome::Completed { order_id });
        }
        if !payable {
            return Err(self.abort_expired(order_id).await);
        }

        match method {
            PaymentMethod::Wallet => {
                let outcome = self.pay_with_wallet(order_id).await?;
                self.clear_cart_for(Some(event_id)).await;
                Ok(outcome)
            }
            PaymentMethod::Gateway => self.redirect_to_gateway(order_id, total).await,
        }
    }

    /// The payment window closed: drop any token for the order and report it.
    pub async fn abort_expired(&mut self, order_id: OrderId) -> SettlementError {
        match self.services.pending.current(&self.session_id).await {
            Ok(Some(token)) if token.order_id == order_id => {
                if let Err(e) = self.services.pending.discard(&self.session_id).await {
                    error!("Failed to drop token for expired order {}: {}", order_id, e);
                }
            }
            Ok(_) => {}
            Err(e) => error!("Failed to read settlement token: {}", e),
        }
        if let Some(order) = self.order.as_mut().filter(|o| o.id == order_id) {
            // Already terminal remotely is fine.
            let _ = order.transition(OrderStatus::Expired);
        }
        self.fail(SettlementError::OrderExpired { order_id })
    }

    /// Snapshot for the recovery view.
    pub async fn order_status(&self, order_id: OrderId) -> Result<OrderStatusView, SettlementError> {
        let remote = self
            .services
            .orders
            .get_order(order_id)
            .await
            .map_err(|e| SettlementError::from_payment(order_id, e))?;
        let order = Order::from_remote(remote, PaymentMethod::Gateway, self.services.rules.order_ttl);
        let now = self.services.clock.now();
        let awaiting_gateway = self
            .services
            .pending
            .current(&self.session_id)
            .await?
            .map(|t| t.order_id == order_id)
            .unwrap_or(false);

        Ok(OrderStatusView {
            remaining_seconds: OrderCountdown::for_order(&order).remaining(now).num_seconds(),
            resumable: order.is_payable(now),
            awaiting_gateway,
            order,
        })
    }

    async fn pay_with_wallet(&mut self, order_id: OrderId) -> Result<CheckoutOutcome, SettlementError> {
        self.set_phase(CheckoutPhase::WalletPaying);
        match self.services.wallet.pay_order_with_wallet(order_id).await {
            Ok(()) => {}
            Err(e) if is_already_paid(&e) => {
                info!("Order {} was already paid", order_id);
            }
            Err(e) => return Err(self.fail(SettlementError::from_payment(order_id, e))),
        }

        self.mark_completed(order_id);
        self.emit(Some(order_id), "ORDER_SETTLED", self.order.as_ref().map(|o| o.total_amount));
        Ok(CheckoutOutcome::Completed { order_id })
    }

    async fn redirect_to_gateway(
        &mut self,
        order_id: OrderId,
        amount: i64,
    ) -> Result<CheckoutOutcome, SettlementError> {
        self.set_phase(CheckoutPhase::GatewayRedirecting);

        // The token has to be durable before anyone leaves for the gateway.
        let now = self.services.clock.now();
        if let Err(e) = self.services.pending.record(&self.session_id, order_id, now).await {
            error!("Could not record pending settlement for order {}: {}", order_id, e);
            return Err(self.fail(SettlementError::NetworkOrServerError {
                order_id: Some(order_id),
                message: "Could not prepare the payment, please try again".to_string(),
            }));
        }

        match self.services.gateway.create_gateway_top_up_link(amount).await {
            Ok(url) => {
                self.emit(Some(order_id), "GATEWAY_REDIRECT", Some(amount));
                Ok(CheckoutOutcome::RedirectToGateway {
                    order_id,
                    redirect_url: Masked::new(url),
                })
            }
            Err(e) => {
                if let Err(store_err) = self.services.pending.discard(&self.session_id).await {
                    error!("Failed to drop unused settlement token: {}", store_err);
                }
                Err(self.fail(SettlementError::from_payment(order_id, e)))
            }
        }
    }

    pub(crate) fn mark_completed(&mut self, order_id: OrderId) {
        self.set_phase(CheckoutPhase::Completed);
        if let Some(order) = self.order.as_mut().filter(|o| o.id == order_id) {
            let _ = order.transition(OrderStatus::Completed);
        }
    }

    async fn persist_cart(&self, cart: &BookingCart) {
        if let Err(e) = self.services.carts.save(&self.session_id, cart).await {
            // The payment went through; a stale snapshot is only cosmetic.
            error!("Failed to persist cart for session {}: {}", self.session_id, e);
        }
    }

    /// Clear the stored cart after a payment, unless it has since moved on
    /// to another event.
    pub(crate) async fn clear_cart_for(&self, event_id: Option<Uuid>) {
        let mut cart = match self.services.carts.load(&self.session_id).await {
            Ok(cart) => cart,
            Err(e) => {
                error!("Failed to load cart for session {}: {}", self.session_id, e);
                return;
            }
        };
        if let (Some(paid), Some(current)) = (event_id, cart.event_id()) {
            if paid != current {
                return;
            }
        }
        cart.clear();
        self.persist_cart(&cart).await;
    }
}
