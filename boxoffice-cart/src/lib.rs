pub mod models;
pub mod cart;
pub mod repository;

pub use models::BookingItem;
pub use cart::{BookingCart, CartChange, CartError};
pub use repository::CartRepository;
