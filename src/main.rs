//! Herbcart - wellness commerce backend

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use herbcart::config::AppConfig;
use herbcart::events::EventPublisher;
use herbcart::gateway::GatewayClient;
use herbcart::routes;
use herbcart::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let events = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => EventPublisher::new(Some(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events disabled");
                EventPublisher::disabled()
            }
        },
        None => EventPublisher::disabled(),
    };

    let gateway = GatewayClient::new(config.gateway.clone())?;
    let port = config.port;
    let state = AppState {
        db,
        config: Arc::new(config),
        gateway,
        events,
    };

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("herbcart listening on 0.0.0.0:{}", port);
    axum::serve(
        tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?,
        app,
    )
    .await?;
    Ok(())
}
