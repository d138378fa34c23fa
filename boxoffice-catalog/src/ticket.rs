use async_trait::async_trait;
use boxoffice_core::BackendResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A purchasable ticket tier of one event, as published by the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketType {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    #[serde(default)]
    pub original_price: Option<i64>,
    pub available_quantity: u32,
}

impl TicketType {
    pub fn inventory_view(&self) -> TicketInventoryView {
        TicketInventoryView {
            ticket_type_id: self.id,
            available_quantity: self.available_quantity,
            price: self.price,
            original_price: self.original_price,
        }
    }
}

/// Read-only snapshot of availability and price for one ticket type.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketInventoryView {
    pub ticket_type_id: Uuid,
    pub available_quantity: u32,
    pub price: i64,
    pub original_price: Option<i64>,
}

impl TicketInventoryView {
    pub fn is_sold_out(&self) -> bool {
        self.available_quantity == 0
    }

    /// Whole-percent markdown from the original price, if any.
    pub fn discount_percent(&self) -> Option<u32> {
        let original = self.original_price?;
        if original <= 0 || original <= self.price {
            return None;
        }
        Some((((original - self.price) * 100) / original) as u32)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub venue: String,
    pub start_time: DateTime<Utc>,
    /// 0 means no per-user cap.
    #[serde(default)]
    pub max_tickets_per_user: u32,
    pub sale_start_time: DateTime<Utc>,
    #[serde(default)]
    pub sale_end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCatalog {
    pub event: Event,
    pub ticket_types: Vec<TicketType>,
}

impl EventCatalog {
    pub fn ticket_type(&self, ticket_type_id: Uuid) -> Option<&TicketType> {
        self.ticket_types.iter().find(|t| t.id == ticket_type_id)
    }
}

/// Catalog collaborator. The core only ever reads from it.
#[async_trait]
pub trait CatalogBackend: Send + Sync {
    async fn get_event_catalog(&self, event_id: Uuid) -> BackendResult<EventCatalog>;
}
