use axum::{http::Method, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod cart;
pub mod checkout;
pub mod error;
pub mod payments;
pub mod sale_window;
pub mod session;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderName::from_static(session::SESSION_HEADER),
        ]);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(cart::routes())
        .merge(checkout::routes())
        .merge(payments::routes())
        .merge(sale_window::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
