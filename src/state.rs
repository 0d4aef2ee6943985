//! Shared application state handed to every handler.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::events::EventPublisher;
use crate::gateway::GatewayClient;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<AppConfig>,
    pub gateway: GatewayClient,
    pub events: EventPublisher,
}
