use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use boxoffice_cart::{BookingCart, BookingItem, CartChange};
use boxoffice_catalog::EventCatalog;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::session::SessionId;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub event_id: Uuid,
    pub ticket_type_id: Uuid,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    pub event_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub event_id: Option<Uuid>,
    pub items: Vec<BookingItem>,
    pub total_amount: i64,
    pub total_quantity: u32,
    /// Set when the last add discarded another event's tickets.
    pub replaced_event_id: Option<Uuid>,
}

impl CartResponse {
    fn new(cart: &BookingCart, change: Option<CartChange>) -> Self {
        let replaced_event_id = match change {
            Some(CartChange::Replaced { previous_event_id }) => Some(previous_event_id),
            _ => None,
        };
        Self {
            event_id: cart.event_id(),
            items: cart.items().to_vec(),
            total_amount: cart.total_amount(),
            total_quantity: cart.total_quantity(),
            replaced_event_id,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/cart", get(get_cart).delete(clear_cart))
        .route("/v1/cart/items", axum::routing::post(add_item))
        .route(
            "/v1/cart/items/{ticket_type_id}",
            put(set_quantity).delete(remove_item),
        )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /v1/cart
pub async fn get_cart(
    State(state): State<AppState>,
    session: SessionId,
) -> Result<Json<CartResponse>, AppError> {
    let cart = state.carts().load(session.as_str()).await?;
    Ok(Json(CartResponse::new(&cart, None)))
}

/// POST /v1/cart/items
/// Vet the merged quantity, then add.
pub async fn add_item(
    State(state): State<AppState>,
    session: SessionId,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, AppError> {
    if req.quantity == 0 {
        return Err(AppError::Validation("quantity must be at least 1".to_string()));
    }
    let _guard = state.sessions.acquire(session.as_str()).await;
    let catalog = state.catalog.get_event_catalog(req.event_id).await?;
    let ticket = catalog
        .ticket_type(req.ticket_type_id)
        .ok_or_else(|| AppError::NotFound(format!("Ticket type {} not found", req.ticket_type_id)))?;

    let mut cart = state.carts().load(session.as_str()).await?;
    // Another event's cart is about to be replaced; judge against an empty one.
    let basis = if cart.event_id() == Some(catalog.event.id) {
        cart.clone()
    } else {
        BookingCart::new()
    };
    let requested = basis
        .item(ticket.id)
        .map(|i| i.quantity)
        .unwrap_or(0)
        .saturating_add(req.quantity);
    check_limits(&state, &basis, &catalog, ticket.id, requested)?;

    let change = cart.add_item(BookingItem::from_catalog(&catalog.event, ticket, req.quantity))?;
    state.carts().save(session.as_str(), &cart).await?;
    tracing::info!("Session {} cart: {:?}", session.as_str(), change);

    Ok(Json(CartResponse::new(&cart, Some(change))))
}

/// PUT /v1/cart/items/{ticket_type_id}
pub async fn set_quantity(
    State(state): State<AppState>,
    session: SessionId,
    Path(ticket_type_id): Path<Uuid>,
    Json(req): Json<SetQuantityRequest>,
) -> Result<Json<CartResponse>, AppError> {
    let _guard = state.sessions.acquire(session.as_str()).await;
    let mut cart = state.carts().load(session.as_str()).await?;

    if req.quantity > 0 {
        if cart.event_id() != Some(req.event_id) {
            return Err(AppError::Validation("Cart holds tickets for another event".to_string()));
        }
        let catalog = state.catalog.get_event_catalog(req.event_id).await?;
        let requested = u32::try_from(req.quantity).unwrap_or(u32::MAX);
        check_limits(&state, &cart, &catalog, ticket_type_id, requested)?;
    }

    cart.set_quantity(ticket_type_id, req.quantity)?;
    state.carts().save(session.as_str(), &cart).await?;
    Ok(Json(CartResponse::new(&cart, None)))
}

/// DELETE /v1/cart/items/{ticket_type_id}
pub async fn remove_item(
    State(state): State<AppState>,
    session: SessionId,
    Path(ticket_type_id): Path<Uuid>,
) -> Result<Json<CartResponse>, AppError> {
    let _guard = state.sessions.acquire(session.as_str()).await;
    let mut cart = state.carts().load(session.as_str()).await?;
    if !cart.remove_item(ticket_type_id) {
        return Err(AppError::NotFound(format!("Ticket type {} not in cart", ticket_type_id)));
    }
    state.carts().save(session.as_str(), &cart).await?;
    Ok(Json(CartResponse::new(&cart, None)))
}

/// DELETE /v1/cart
pub async fn clear_cart(
    State(state): State<AppState>,
    session: SessionId,
) -> Result<Json<CartResponse>, AppError> {
    let _guard = state.sessions.acquire(session.as_str()).await;
    state.carts().discard(session.as_str()).await?;
    Ok(Json(CartResponse::new(&BookingCart::new(), None)))
}

fn check_limits(
    state: &AppState,
    cart: &BookingCart,
    catalog: &EventCatalog,
    ticket_type_id: Uuid,
    requested: u32,
) -> Result<(), AppError> {
    let ticket = catalog
        .ticket_type(ticket_type_id)
        .ok_or_else(|| AppError::NotFound(format!("Ticket type {} not found", ticket_type_id)))?;
    let decision = state
        .limits
        .can_set_quantity(cart, &ticket.inventory_view(), &catalog.event, requested);
    match decision.reason {
        Some(reason) if !decision.allowed => Err(AppError::Limit(reason)),
        _ => Ok(()),
    }
}
