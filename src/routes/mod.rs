//! HTTP surface: router assembly and shared list envelopes.

pub mod addresses;
pub mod cart;
pub mod orders;
pub mod payments;
pub mod products;

use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListParams {
    pub fn clamp(&self) -> (u32, u32) {
        (self.page.unwrap_or(1).max(1), self.per_page.unwrap_or(20).min(100))
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({"status": "healthy", "service": "herbcart"})) }),
        )
        .route("/api/v1/products", get(products::list_products).post(products::create_product))
        .route("/api/v1/products/:id", get(products::get_product))
        .route("/api/v1/addresses", get(addresses::list_addresses).post(addresses::create_address))
        .route(
            "/api/v1/cart",
            get(cart::get_cart).delete(cart::clear_cart),
        )
        .route("/api/v1/cart/items", post(cart::add_to_cart))
        .route("/api/v1/cart/items/:id", delete(cart::remove_cart_item))
        .route("/api/v1/orders", get(orders::list_orders).post(orders::create_order))
        .route("/api/v1/orders/:id", get(orders::get_order))
        .route("/api/v1/orders/:id/cancel", post(orders::cancel_order))
        .route("/api/v1/payments/sessions", get(payments::list_sessions))
        .route("/api/v1/payments/sessions/:id", get(payments::get_session))
        .route("/api/v1/payments/create-session", post(payments::create_session))
        .route(
            "/api/v1/payments/process-card-payment",
            post(payments::process_card_payment),
        )
        .route("/api/v1/payments/verify-otp", post(payments::verify_otp))
        .route(
            "/api/v1/payments/status/:gateway_order_id",
            get(payments::get_payment_status),
        )
        .route("/api/v1/payments/webhook", post(payments::payment_webhook))
        .with_state(state)
}
