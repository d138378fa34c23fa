use boxoffice_core::{GatewayReturnParams, OrderId, OrderStatus};
use tracing::{info, warn};

use crate::error::{is_already_paid, SettlementError};
use crate::models::{
    CheckoutPhase, PendingSettlementToken, ReconciliationOutcome, ResolvedSettlement, UnpaidReason,
};
use crate::orchestrator::SettlementOrchestrator;

impl SettlementOrchestrator {
    /// Resolve whatever came back from the gateway. Works on a freshly built
    /// orchestrator: the pending token is the only state carried across the
    /// redirect. Every terminal outcome consumes the token, except a replay
    /// of a return already resolved, which leaves it for its own return.
    pub async fn reconcile_gateway_return(
        &mut self,
        params: &GatewayReturnParams,
    ) -> Result<ReconciliationOutcome, SettlementError> {
        let session_id = self.session_id.clone();
        let fingerprint = params.raw_query().to_string();
        let token = self.services.pending.current(&session_id).await?;
        // A return we already handled; whatever token is live now belongs to a later attempt.
        let replayed = self
            .services
            .pending
            .last_resolved(&session_id)
            .await?
            .filter(|r| r.return_fingerprint.expose() == fingerprint.as_str());

        // 1. Verify the return with the backend, which also credits the wallet
        let verification = match self.services.gateway.verify_gateway_return(params).await {
            Ok(v) => v,
            Err(e) if e.is_transient() => {
                // Token stays: the same return can be replayed once the backend answers.
                warn!("Gateway return verification unavailable: {}", e);
                return Err(SettlementError::NetworkOrServerError {
                    order_id: token.map(|t| t.order_id),
                    message: e.message().to_string(),
                });
            }
            Err(e) => {
                let resumable_order = self.consume_on_failure(&session_id, token, replayed, &fingerprint).await?;
                return Err(self.failed_return(None, e.message().to_string(), resumable_order));
            }
        };

        if !verification.is_success(&self.services.rules.gateway_success_code) {
            let resumable_order = self.consume_on_failure(&session_id, token, replayed, &fingerprint).await?;
            return Err(self.failed_return(
                Some(verification.code),
                verification.message,
                resumable_order,
            ));
        }

        if let Some(resolved) = replayed {
            return Ok(self.replayed_return(resolved).await);
        }

        // 2. Funds are in the wallet; is there an order waiting for them?
        match token {
            Some(token) => self.settle(&session_id, token, &fingerprint).await,
            None => {
                info!("Gateway return without pending order: wallet top-up only");
                self.emit(None, "TOP_UP_ONLY", None);
                Ok(ReconciliationOutcome::TopUpOnly)
            }
        }
    }

    /// A rejected return resolves the live token, unless it is a replay of
    /// one already resolved. Returns the order the user can resume.
    async fn consume_on_failure(
        &self,
        session_id: &str,
        token: Option<PendingSettlementToken>,
        replayed: Option<ResolvedSettlement>,
        fingerprint: &str,
    ) -> Result<Option<OrderId>, SettlementError> {
        if let Some(resolved) = replayed {
            return Ok(Some(resolved.token.order_id));
        }
        let Some(token) = token else {
            return Ok(None);
        };
        let order_id = token.order_id;
        self.services
            .pending
            .resolve(session_id, token, fingerprint, false, self.services.clock.now())
            .await?;
        Ok(Some(order_id))
    }

    /// Report what an earlier, identical return ended in. Never pays and
    /// never touches the live token.
    async fn replayed_return(&mut self, resolved: ResolvedSettlement) -> ReconciliationOutcome {
        let order_id = resolved.token.order_id;
        if resolved.settled {
            info!("Duplicate gateway return for order {}", order_id);
            self.set_phase(CheckoutPhase::Completed);
            return ReconciliationOutcome::AlreadySettled { order_id };
        }

        // The funds landed earlier but the order stayed unpaid; it may have moved since.
        let mut reason = resolved
            .unpaid_reason
            .unwrap_or_else(|| UnpaidReason::PaymentFailed("Order is still awaiting payment".to_string()));
        match self.services.orders.get_order(order_id).await {
            Ok(remote) if remote.status == OrderStatus::Completed => {
                info!("Replayed gateway return; order {} has since been paid", order_id);
                self.mark_completed(order_id);
                return ReconciliationOutcome::AlreadySettled { order_id };
            }
            Ok(remote) => {
                let lapsed = matches!(remote.status, OrderStatus::Expired | OrderStatus::Cancelled)
                    || self.services.clock.now() >= remote.created_at + self.services.rules.order_ttl;
                if lapsed {
                    reason = UnpaidReason::Expired;
                }
            }
            Err(e) => warn!("Could not refresh order {} for replayed return: {}", order_id, e),
        }

        self.set_phase(CheckoutPhase::Failed);
        warn!("Replayed gateway return: order {} still unpaid ({:?})", order_id, reason);
        let outcome = ReconciliationOutcome::FundsReceivedOrderUnpaid { order_id, reason };
        self.emit(Some(order_id), outcome.as_str(), None);
        outcome
    }

    async fn settle(
        &mut self,
        session_id: &str,
        token: PendingSettlementToken,
        fingerprint: &str,
    ) -> Result<ReconciliationOutcome, SettlementError> {
        let order_id = token.order_id;

        // 3. The token may be stale: check the order before paying
        let mut event_id = None;
        match self.services.orders.get_order(order_id).await {
            Ok(remote) => {
                event_id = Some(remote.event_id);
                let expired = remote.status == OrderStatus::Pending
                    && self.services.clock.now() >= remote.created_at + self.services.rules.order_ttl;
                match remote.status {
                    OrderStatus::Completed => {
                        self.resolve_settled(session_id, token, fingerprint).await;
                        self.mark_completed(order_id);
                        self.clear_cart_for(event_id).await;
                        return Ok(ReconciliationOutcome::AlreadySettled { order_id });
                    }
                    OrderStatus::Expired | OrderStatus::Cancelled => {
                        return self.unpaid(session_id, token, fingerprint, UnpaidReason::Expired).await;
                    }
                    OrderStatus::Pending if expired => {
                        return self.unpaid(session_id, token, fingerprint, UnpaidReason::Expired).await;
                    }
                    OrderStatus::Pending => {}
                }
            }
            Err(e) => warn!("Could not refresh order {} before payment: {}", order_id, e),
        }

        // 4. Pay the order from the freshly credited wallet
        self.set_phase(CheckoutPhase::WalletPaying);
        let outcome = match self.services.wallet.pay_order_with_wallet(order_id).await {
            Ok(()) => ReconciliationOutcome::OrderSettled { order_id },
            Err(e) if is_already_paid(&e) => ReconciliationOutcome::AlreadySettled { order_id },
            Err(e) => {
                let reason = UnpaidReason::PaymentFailed(e.message().to_string());
                return self.unpaid(session_id, token, fingerprint, reason).await;
            }
        };

        self.resolve_settled(session_id, token, fingerprint).await;
        self.mark_completed(order_id);
        self.clear_cart_for(event_id).await;
        self.emit(Some(order_id), outcome.as_str(), None);
        info!("Order {} settled after gateway return ({})", order_id, outcome.as_str());
        Ok(outcome)
    }

    /// The money has moved by now. A token left behind is consumed by the
    /// next replay through the Completed branch.
    async fn resolve_settled(&self, session_id: &str, token: PendingSettlementToken, fingerprint: &str) {
        let order_id = token.order_id;
        if let Err(e) = self
            .services
            .pending
            .resolve(session_id, token, fingerprint, true, self.services.clock.now())
            .await
        {
            warn!("Order {} settled but its token could not be resolved: {}", order_id, e);
        }
    }

    async fn unpaid(
        &mut self,
        session_id: &str,
        token: PendingSettlementToken,
        fingerprint: &str,
        reason: UnpaidReason,
    ) -> Result<ReconciliationOutcome, SettlementError> {
        let order_id = token.order_id;
        self.services
            .pending
            .resolve_unpaid(session_id, token, fingerprint, reason.clone(), self.services.clock.now())
            .await?;
        self.set_phase(CheckoutPhase::Failed);
        warn!("Funds received but order {} unpaid: {:?}", order_id, reason);

        let outcome = ReconciliationOutcome::FundsReceivedOrderUnpaid { order_id, reason };
        self.emit(Some(order_id), outcome.as_str(), None);
        Ok(outcome)
    }

    fn failed_return(
        &mut self,
        code: Option<String>,
        message: String,
        resumable_order: Option<OrderId>,
    ) -> SettlementError {
        self.set_phase(CheckoutPhase::Failed);
        let err = SettlementError::GatewayVerificationFailed {
            code,
            message,
            resumable_order,
        };
        warn!("Gateway return rejected: {}", err);
        self.emit(resumable_order, err.kind(), None);
        err
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use boxoffice_cart::{BookingCart, BookingItem};
    use boxoffice_catalog::{Event, EventCatalog, SaleWindowState, TicketType};
    use boxoffice_core::{BackendError, Clock, ManualClock, OrderId, PaymentMethod};
    use boxoffice_store::{MemorySlotStore, MockBackend, SlotKey, SlotStore};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::models::CheckoutOutcome;
    use crate::orchestrator::SettlementServices;
    use async_trait::async_trait;
    use boxoffice_store::StoreError;

    /// Memory slots whose resolved-settlement writes always fail.
    #[derive(Default)]
    struct ResolvedSlotDown {
        inner: MemorySlotStore,
    }

    #[async_trait]
    impl SlotStore for ResolvedSlotDown {
        async fn read(&self, slot: &str) -> Result<Option<String>, StoreError> {
            self.inner.read(slot).await
        }

        async fn write(&self, slot: &str, value: &str) -> Result<(), StoreError> {
            if slot.starts_with("settlement:resolved:") {
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            self.inner.write(slot, value).await
        }

        async fn clear(&self, slot: &str) -> Result<bool, StoreError> {
            self.inner.clear(slot).await
        }
    }

    struct Fixture {
        backend: Arc<MockBackend>,
        slots: Arc<dyn SlotStore>,
        clock: Arc<ManualClock>,
        services: SettlementServices,
        event: Event,
        ticket: TicketType,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let backend = Arc::new(MockBackend::new().with_clock(clock.clone()));
        let event = Event {
            id: Uuid::new_v4(),
            name: "Symphony No. 9".to_string(),
            venue: "Concert Hall".to_string(),
            start_time: clock.now() + Duration::days(30),
            max_tickets_per_user: 6,
            sale_start_time: clock.now() - Duration::days(1),
            sale_end_time: Some(clock.now() + Duration::days(29)),
        };
        let ticket = TicketType {
            id: Uuid::new_v4(),
            name: "Balcony".to_string(),
            price: 150_000,
            original_price: Some(200_000),
            available_quantity: 20,
        };
        backend.add_catalog(EventCatalog {
            event: event.clone(),
            ticket_types: vec![ticket.clone()],
        });

        let slots: Arc<dyn SlotStore> = Arc::new(MemorySlotStore::new());
        let services = SettlementServices::from_backend(backend.clone(), slots.clone())
            .with_clock(clock.clone());
        Fixture {
            backend,
            slots,
            clock,
            services,
            event,
            ticket,
        }
    }

    /// Gateway checkout for two tickets; returns the order id with the cart
    /// saved and the token written.
    async fn start_gateway_checkout(f: &Fixture) -> OrderId {
        let mut cart = BookingCart::new();
        cart.add_item(BookingItem::from_catalog(&f.event, &f.ticket, 2))
            .unwrap();
        f.services.carts.save("s1", &cart).await.unwrap();

        let mut orchestrator = SettlementOrchestrator::new(f.services.clone(), "s1");
        match orchestrator
            .checkout(&mut cart, PaymentMethod::Gateway, SaleWindowState::Open)
            .await
            .unwrap()
        {
            CheckoutOutcome::RedirectToGateway { order_id, .. } => order_id,
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    fn success_return(txn: &str) -> GatewayReturnParams {
        GatewayReturnParams::from_raw(format!(
            "?vnp_Amount=300000&vnp_ResponseCode=00&vnp_TxnRef={}&vnp_SecureHash=abc",
            txn
        ))
    }

    async fn pending_slot(f: &Fixture) -> Option<String> {
        f.slots.read(&SlotKey::pending_settlement("s1")).await.unwrap()
    }

    #[tokio::test]
    async fn test_gateway_success_settles_order_in_fresh_orchestrator() {
        let f = fixture();
        let order_id = start_gateway_checkout(&f).await;

        // Fresh instance, as after the browser comes back.
        let mut returned = SettlementOrchestrator::new(f.services.clone(), "s1");
        let outcome = returned
            .reconcile_gateway_return(&success_return("1"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconciliationOutcome::OrderSettled { order_id });
        assert_eq!(f.backend.order(order_id).unwrap().status, OrderStatus::Completed);
        assert_eq!(f.backend.balance(), 0);
        assert_eq!(f.backend.calls().wallet_debits, 1);
        assert!(pending_slot(&f).await.is_none());
        assert!(f.services.carts.load("s1").await.unwrap().is_empty());
        assert_eq!(returned.phase(), CheckoutPhase::Completed);
    }

    #[tokio::test]
    async fn test_gateway_failure_keeps_order_resumable() {
        let f = fixture();
        let order_id = start_gateway_checkout(&f).await;

        let mut returned = SettlementOrchestrator::new(f.services.clone(), "s1");
        let err = returned
            .reconcile_gateway_return(&GatewayReturnParams::from_raw(
                "vnp_ResponseCode=24&vnp_TxnRef=1",
            ))
            .await
            .unwrap_err();

        match err {
            SettlementError::GatewayVerificationFailed { code, resumable_order, .. } => {
                assert_eq!(code.as_deref(), Some("24"));
                assert_eq!(resumable_order, Some(order_id));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(pending_slot(&f).await.is_none());
        assert_eq!(f.backend.calls().pay_order_with_wallet, 0);
        assert_eq!(f.backend.order(order_id).unwrap().status, OrderStatus::Pending);
        // The cart is left for another attempt.
        assert_eq!(f.services.carts.load("s1").await.unwrap().total_quantity(), 2);
    }

    #[tokio::test]
    async fn test_success_without_token_is_top_up_only() {
        let f = fixture();

        let mut returned = SettlementOrchestrator::new(f.services.clone(), "s1");
        let outcome = returned
            .reconcile_gateway_return(&success_return("topup"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconciliationOutcome::TopUpOnly);
        assert_eq!(f.backend.balance(), 300_000);
        assert_eq!(f.backend.calls().pay_order_with_wallet, 0);
    }

    #[tokio::test]
    async fn test_duplicate_return_pays_once() {
        let f = fixture();
        let order_id = start_gateway_checkout(&f).await;
        let params = success_return("dup");

        let first = SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&params)
            .await
            .unwrap();
        let second = SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&params)
            .await
            .unwrap();

        assert_eq!(first, ReconciliationOutcome::OrderSettled { order_id });
        assert_eq!(second, ReconciliationOutcome::AlreadySettled { order_id });
        assert_eq!(f.backend.calls().wallet_debits, 1);
        assert!(second.is_settled());
    }

    #[tokio::test]
    async fn test_already_paid_on_pay_counts_as_settled() {
        let f = fixture();
        let order_id = start_gateway_checkout(&f).await;
        f.backend.fail_next_payment(BackendError::Server {
            status: 400,
            message: "Đơn hàng đã được thanh toán".to_string(),
        });

        let outcome = SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&success_return("2"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconciliationOutcome::AlreadySettled { order_id });
        assert!(pending_slot(&f).await.is_none());
    }

    #[tokio::test]
    async fn test_stale_token_for_paid_order_skips_payment() {
        let f = fixture();
        let order_id = start_gateway_checkout(&f).await;
        f.backend.set_order_status(order_id, OrderStatus::Completed);

        let outcome = SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&success_return("3"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconciliationOutcome::AlreadySettled { order_id });
        assert_eq!(f.backend.calls().pay_order_with_wallet, 0);
    }

    #[tokio::test]
    async fn test_expired_order_reports_funds_received() {
        let f = fixture();
        let order_id = start_gateway_checkout(&f).await;
        f.clock.advance(Duration::minutes(12));

        let outcome = SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&success_return("4"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReconciliationOutcome::FundsReceivedOrderUnpaid {
                order_id,
                reason: UnpaidReason::Expired,
            }
        );
        assert_eq!(f.backend.balance(), 300_000);
        assert!(pending_slot(&f).await.is_none());
    }

    #[tokio::test]
    async fn test_payment_failure_after_top_up_is_partial_success() {
        let f = fixture();
        let order_id = start_gateway_checkout(&f).await;
        f.backend
            .fail_next_payment(BackendError::Unavailable("connection reset".into()));

        let mut returned = SettlementOrchestrator::new(f.services.clone(), "s1");
        let outcome = returned
            .reconcile_gateway_return(&success_return("5"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ReconciliationOutcome::FundsReceivedOrderUnpaid {
                order_id,
                reason: UnpaidReason::PaymentFailed("connection reset".to_string()),
            }
        );
        assert!(pending_slot(&f).await.is_none());
        assert_eq!(returned.phase(), CheckoutPhase::Failed);

        // The recovery view can still finish the job from the credited wallet.
        let resumed = SettlementOrchestrator::new(f.services.clone(), "s1")
            .resume_payment(order_id, PaymentMethod::Wallet)
            .await
            .unwrap();
        assert_eq!(resumed, CheckoutOutcome::Completed { order_id });
        assert_eq!(f.backend.balance(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_verification_keeps_token() {
        let f = fixture();
        let order_id = start_gateway_checkout(&f).await;
        f.backend
            .fail_next_verification(BackendError::Unavailable("timeout".into()));

        let err = SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&success_return("6"))
            .await
            .unwrap_err();

        assert_eq!(err.order_id(), Some(order_id));
        assert!(err.is_retryable());
        assert!(pending_slot(&f).await.is_some());

        // Replaying the same return once the backend is back settles the order.
        let outcome = SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&success_return("6"))
            .await
            .unwrap();
        assert_eq!(outcome, ReconciliationOutcome::OrderSettled { order_id });
    }

    #[tokio::test]
    async fn test_rejected_signature_consumes_token() {
        let f = fixture();
        let order_id = start_gateway_checkout(&f).await;
        f.backend.fail_next_verification(BackendError::ValidationFailed {
            field: Some("vnp_SecureHash".into()),
            message: "Invalid signature".into(),
        });

        let err = SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&success_return("7"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SettlementError::GatewayVerificationFailed { resumable_order: Some(id), .. } if id == order_id
        ));
        assert!(pending_slot(&f).await.is_none());
    }

    #[tokio::test]
    async fn test_replayed_return_leaves_newer_token_alone() {
        let f = fixture();
        let first_order = start_gateway_checkout(&f).await;
        let first_return = success_return("first");
        let outcome = SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&first_return)
            .await
            .unwrap();
        assert_eq!(outcome, ReconciliationOutcome::OrderSettled { order_id: first_order });

        let second_order = start_gateway_checkout(&f).await;

        // The browser re-delivers the first landing page.
        let replay = SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&first_return)
            .await
            .unwrap();
        assert_eq!(replay, ReconciliationOutcome::AlreadySettled { order_id: first_order });
        assert_eq!(f.backend.calls().pay_order_with_wallet, 1);
        let token = f.services.pending.current("s1").await.unwrap().unwrap();
        assert_eq!(token.order_id, second_order);

        let outcome = SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&success_return("second"))
            .await
            .unwrap();
        assert_eq!(outcome, ReconciliationOutcome::OrderSettled { order_id: second_order });
        assert_eq!(f.backend.order(second_order).unwrap().status, OrderStatus::Completed);
        assert_eq!(f.backend.calls().wallet_debits, 2);
    }

    #[tokio::test]
    async fn test_replayed_rejection_leaves_newer_token_alone() {
        let f = fixture();
        let first_order = start_gateway_checkout(&f).await;
        let rejected = GatewayReturnParams::from_raw("vnp_ResponseCode=24&vnp_TxnRef=1");
        SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&rejected)
            .await
            .unwrap_err();

        let second_order = start_gateway_checkout(&f).await;
        let err = SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&rejected)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SettlementError::GatewayVerificationFailed { resumable_order: Some(id), .. } if id == first_order
        ));
        let token = f.services.pending.current("s1").await.unwrap().unwrap();
        assert_eq!(token.order_id, second_order);
    }

    #[tokio::test]
    async fn test_replay_after_partial_success_still_points_to_order() {
        let f = fixture();
        let order_id = start_gateway_checkout(&f).await;
        f.backend
            .fail_next_payment(BackendError::Unavailable("connection reset".into()));
        let params = success_return("partial");

        let first = SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&params)
            .await
            .unwrap();
        let unpaid = ReconciliationOutcome::FundsReceivedOrderUnpaid {
            order_id,
            reason: UnpaidReason::PaymentFailed("connection reset".to_string()),
        };
        assert_eq!(first, unpaid);

        let mut replayed = SettlementOrchestrator::new(f.services.clone(), "s1");
        let second = replayed.reconcile_gateway_return(&params).await.unwrap();
        assert_eq!(second, unpaid);
        assert_eq!(replayed.phase(), CheckoutPhase::Failed);
        assert_eq!(f.backend.calls().pay_order_with_wallet, 1);
        assert_eq!(f.backend.balance(), 300_000);

        // Once the order lapses the replay says so.
        f.clock.advance(Duration::minutes(11));
        let third = SettlementOrchestrator::new(f.services.clone(), "s1")
            .reconcile_gateway_return(&params)
            .await
            .unwrap();
        assert_eq!(
            third,
            ReconciliationOutcome::FundsReceivedOrderUnpaid {
                order_id,
                reason: UnpaidReason::Expired,
            }
        );
    }

    #[tokio::test]
    async fn test_settled_order_survives_unwritable_record() {
        let f = fixture();
        let slots: Arc<dyn SlotStore> = Arc::new(ResolvedSlotDown::default());
        let services = SettlementServices::from_backend(f.backend.clone(), slots.clone())
            .with_clock(f.clock.clone());
        let mut cart = BookingCart::new();
        cart.add_item(BookingItem::from_catalog(&f.event, &f.ticket, 2))
            .unwrap();
        services.carts.save("s1", &cart).await.unwrap();
        let order_id = match SettlementOrchestrator::new(services.clone(), "s1")
            .checkout(&mut cart, PaymentMethod::Gateway, SaleWindowState::Open)
            .await
            .unwrap()
        {
            CheckoutOutcome::RedirectToGateway { order_id, .. } => order_id,
            other => panic!("expected redirect, got {:?}", other),
        };

        let mut returned = SettlementOrchestrator::new(services.clone(), "s1");
        let outcome = returned
            .reconcile_gateway_return(&success_return("8"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconciliationOutcome::OrderSettled { order_id });
        assert_eq!(returned.phase(), CheckoutPhase::Completed);
        assert!(services.carts.load("s1").await.unwrap().is_empty());

        // The token left behind is consumed without a second debit.
        let replay = SettlementOrchestrator::new(services.clone(), "s1")
            .reconcile_gateway_return(&success_return("8"))
            .await
            .unwrap();
        assert_eq!(replay, ReconciliationOutcome::AlreadySettled { order_id });
        assert_eq!(f.backend.calls().wallet_debits, 1);
    }
}
