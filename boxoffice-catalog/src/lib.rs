pub mod ticket;
pub mod limits;
pub mod sale_window;

pub use ticket::{CatalogBackend, Event, EventCatalog, TicketInventoryView, TicketType};
pub use limits::{LimitBound, LimitDecision, LimitEnforcer, LimitReason, QuantityView, HARD_TYPE_CAP};
pub use sale_window::{compute_state, SaleWindow, SaleWindowHandle, SaleWindowState};
