use boxoffice_catalog::{Event, TicketType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One selected ticket type. Only `quantity` changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingItem {
    pub ticket_type_id: Uuid,
    pub ticket_type_name: String,
    pub quantity: u32,
    pub unit_price: i64,
    pub event_id: Uuid,
    pub event_name: String,
    pub event_start_time: DateTime<Utc>,
    pub event_venue: String,
}

impl BookingItem {
    pub fn from_catalog(event: &Event, ticket: &TicketType, quantity: u32) -> Self {
        Self {
            ticket_type_id: ticket.id,
            ticket_type_name: ticket.name.clone(),
            quantity,
            unit_price: ticket.price,
            event_id: event.id,
            event_name: event.name.clone(),
            event_start_time: event.start_time,
            event_venue: event.venue.clone(),
        }
    }

    pub fn line_total(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}
