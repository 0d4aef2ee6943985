//! Herbcart
//!
//! Self-hosted wellness commerce backend: catalog lookups, per-user carts,
//! immutable order snapshots with an append-only status trail, and a
//! card-payment gateway adapter with webhook reconciliation.

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod gateway;
pub mod routes;
pub mod state;

pub use config::AppConfig;
pub use error::ApiError;
pub use state::AppState;
