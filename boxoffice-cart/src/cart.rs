use boxoffice_catalog::QuantityView;
use boxoffice_core::OrderLine;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::models::BookingItem;

/// What an `add_item` call did to the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartChange {
    Added,
    Merged { quantity: u32 },
    /// The cart held another event's tickets; they were discarded.
    Replaced { previous_event_id: Uuid },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CartError {
    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Ticket type not in cart: {0}")]
    ItemNotFound(Uuid),

    #[error("Quantity too large")]
    QuantityOverflow,
}

/// Tickets selected for exactly one event, in the order they were picked.
/// Empty exactly when no event is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingCart {
    items: Vec<BookingItem>,
    event_id: Option<Uuid>,
}

impl BookingCart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[BookingItem] {
        &self.items
    }

    pub fn event_id(&self) -> Option<Uuid> {
        self.event_id
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, ticket_type_id: Uuid) -> Option<&BookingItem> {
        self.items.iter().find(|i| i.ticket_type_id == ticket_type_id)
    }

    /// Add a selection. Same type merges by summing; another event's item
    /// replaces the whole cart.
    pub fn add_item(&mut self, item: BookingItem) -> Result<CartChange, CartError> {
        if item.quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }

        match self.event_id {
            Some(current) if current != item.event_id => {
                debug!("Cart switched from event {} to {}", current, item.event_id);
                self.items = vec![item.clone()];
                self.event_id = Some(item.event_id);
                Ok(CartChange::Replaced { previous_event_id: current })
            }
            Some(_) => {
                if let Some(existing) = self.items.iter_mut().find(|i| i.ticket_type_id == item.ticket_type_id) {
                    existing.quantity = existing
                        .quantity
                        .checked_add(item.quantity)
                        .ok_or(CartError::QuantityOverflow)?;
                    return Ok(CartChange::Merged { quantity: existing.quantity });
                }
                self.items.push(item);
                Ok(CartChange::Added)
            }
            None => {
                self.event_id = Some(item.event_id);
                self.items.push(item);
                Ok(CartChange::Added)
            }
        }
    }

    /// Returns whether the type was in the cart.
    pub fn remove_item(&mut self, ticket_type_id: Uuid) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.ticket_type_id != ticket_type_id);
        if self.items.is_empty() {
            self.event_id = None;
        }
        self.items.len() != before
    }

    /// Overwrite a line's quantity (the +/- controls). Zero or below removes it.
    pub fn set_quantity(&mut self, ticket_type_id: Uuid, quantity: i64) -> Result<(), CartError> {
        if quantity <= 0 {
            self.remove_item(ticket_type_id);
            return Ok(());
        }

        let item = self
            .items
            .iter_mut()
            .find(|i| i.ticket_type_id == ticket_type_id)
            .ok_or(CartError::ItemNotFound(ticket_type_id))?;
        item.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.event_id = None;
    }

    pub fn total_amount(&self) -> i64 {
        self.items.iter().map(BookingItem::line_total).sum()
    }

    pub fn total_quantity(&self) -> u32 {
        self.items.iter().fold(0u32, |acc, i| acc.saturating_add(i.quantity))
    }

    /// Non-empty and every item belongs to the cart's event.
    pub fn is_valid(&self) -> bool {
        match self.event_id {
            Some(event_id) => {
                !self.items.is_empty()
                    && self.items.iter().all(|i| i.event_id == event_id && i.quantity >= 1)
            }
            None => false,
        }
    }

    /// True for a valid cart and for the empty cart; false for any snapshot
    /// that could not have come out of the mutators.
    pub fn is_consistent(&self) -> bool {
        if self.items.is_empty() {
            return self.event_id.is_none();
        }
        self.is_valid()
    }

    pub fn order_lines(&self) -> Vec<OrderLine> {
        self.items
            .iter()
            .map(|i| OrderLine {
                ticket_type_id: i.ticket_type_id,
                quantity: i.quantity,
            })
            .collect()
    }
}

impl QuantityView for BookingCart {
    fn total_quantity(&self) -> u32 {
        BookingCart::total_quantity(self)
    }

    fn quantity_of(&self, ticket_type_id: Uuid) -> u32 {
        self.item(ticket_type_id).map(|i| i.quantity).unwrap_or(0)
    }
}
