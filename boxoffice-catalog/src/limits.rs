use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ticket::{Event, TicketInventoryView};

/// Per-type ceiling applied regardless of how many tickets remain.
pub const HARD_TYPE_CAP: u32 = 10;

/// Quantities the limit checks need from a cart.
pub trait QuantityView {
    fn total_quantity(&self) -> u32;
    fn quantity_of(&self, ticket_type_id: Uuid) -> u32;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitBound {
    Availability,
    HardCap,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LimitReason {
    SoldOut,
    UserLimitReached { max_per_user: u32 },
    TypeLimitReached { limit: u32, bound: LimitBound },
}

impl LimitReason {
    pub fn message(&self) -> String {
        match self {
            LimitReason::SoldOut => "This ticket type is sold out".to_string(),
            LimitReason::UserLimitReached { max_per_user } => {
                format!("You can buy at most {} tickets for this event", max_per_user)
            }
            LimitReason::TypeLimitReached { limit, bound: LimitBound::Availability } => {
                format!("Only {} tickets of this type are left", limit)
            }
            LimitReason::TypeLimitReached { limit, bound: LimitBound::HardCap } => {
                format!("At most {} tickets of one type per order", limit)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitDecision {
    pub allowed: bool,
    pub reason: Option<LimitReason>,
}

impl LimitDecision {
    pub fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    pub fn deny(reason: LimitReason) -> Self {
        Self { allowed: false, reason: Some(reason) }
    }
}

/// Advisory quantity checks run before every cart change so the caller can
/// disable the affordance. The backend re-checks at order creation.
#[derive(Debug, Clone, Copy)]
pub struct LimitEnforcer {
    per_type_cap: u32,
}

impl LimitEnforcer {
    pub fn new(per_type_cap: u32) -> Self {
        Self { per_type_cap }
    }

    pub fn per_type_cap(&self) -> u32 {
        self.per_type_cap
    }

    fn type_limit(&self, ticket: &TicketInventoryView) -> (u32, LimitBound) {
        if ticket.available_quantity < self.per_type_cap {
            (ticket.available_quantity, LimitBound::Availability)
        } else {
            (self.per_type_cap, LimitBound::HardCap)
        }
    }

    /// May the cart take one more ticket of this type?
    pub fn can_increment<C: QuantityView + ?Sized>(
        &self,
        cart: &C,
        ticket: &TicketInventoryView,
        event: &Event,
    ) -> LimitDecision {
        if ticket.is_sold_out() {
            return LimitDecision::deny(LimitReason::SoldOut);
        }

        if event.max_tickets_per_user > 0 && cart.total_quantity() >= event.max_tickets_per_user {
            return LimitDecision::deny(LimitReason::UserLimitReached {
                max_per_user: event.max_tickets_per_user,
            });
        }

        let (limit, bound) = self.type_limit(ticket);
        if cart.quantity_of(ticket.ticket_type_id) >= limit {
            return LimitDecision::deny(LimitReason::TypeLimitReached { limit, bound });
        }

        LimitDecision::allow()
    }

    /// May this type's line be set to `requested`? Decreases always pass.
    pub fn can_set_quantity<C: QuantityView + ?Sized>(
        &self,
        cart: &C,
        ticket: &TicketInventoryView,
        event: &Event,
        requested: u32,
    ) -> LimitDecision {
        let current = cart.quantity_of(ticket.ticket_type_id);
        if requested <= current {
            return LimitDecision::allow();
        }

        if ticket.is_sold_out() {
            return LimitDecision::deny(LimitReason::SoldOut);
        }

        let new_total = cart.total_quantity().saturating_sub(current).saturating_add(requested);
        if event.max_tickets_per_user > 0 && new_total > event.max_tickets_per_user {
            return LimitDecision::deny(LimitReason::UserLimitReached {
                max_per_user: event.max_tickets_per_user,
            });
        }

        let (limit, bound) = self.type_limit(ticket);
        if requested > limit {
            return LimitDecision::deny(LimitReason::TypeLimitReached { limit, bound });
        }

        LimitDecision::allow()
    }
}

impl Default for LimitEnforcer {
    fn default() -> Self {
        Self::new(HARD_TYPE_CAP)
    }
}
