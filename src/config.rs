//! Startup configuration
//!
//! Everything tunable lives here and is parsed from the environment exactly
//! once; the rest of the crate receives it through `AppState`.

use anyhow::{Context, Result};

use crate::domain::order::PricingPolicy;
use crate::gateway::GatewayConfig;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    /// Base URL this service is reachable at; used to default the gateway
    /// return/notify URLs when the caller does not supply them.
    pub public_base_url: String,
    pub currency: String,
    pub pricing: PricingPolicy,
    pub gateway: GatewayConfig,
    pub nats_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let port = opt_var("PORT")
            .map(|v| v.parse::<u16>().context("PORT must be a port number"))
            .transpose()?
            .unwrap_or(8083);
        let public_base_url = opt_var("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{}", port));

        let pricing = PricingPolicy {
            shipping_fee: parse_i64("SHIPPING_FEE_PAISE", 5_000)?,
            free_shipping_threshold: parse_i64("FREE_SHIPPING_THRESHOLD_PAISE", 50_000)?,
            tax_rate_bps: parse_i64("TAX_RATE_BPS", 1_800)?,
        };

        let gateway = GatewayConfig {
            base_url: std::env::var("GATEWAY_BASE_URL")
                .context("GATEWAY_BASE_URL is not set")?,
            client_id: std::env::var("GATEWAY_CLIENT_ID")
                .context("GATEWAY_CLIENT_ID is not set")?,
            client_secret: std::env::var("GATEWAY_CLIENT_SECRET")
                .context("GATEWAY_CLIENT_SECRET is not set")?,
            api_version: opt_var("GATEWAY_API_VERSION")
                .unwrap_or_else(|| "2023-08-01".to_string()),
            webhook_secret: std::env::var("GATEWAY_WEBHOOK_SECRET")
                .context("GATEWAY_WEBHOOK_SECRET is not set")?,
            mode: opt_var("GATEWAY_MODE").unwrap_or_else(|| "sandbox".to_string()),
        };

        Ok(Self {
            database_url,
            port,
            public_base_url,
            currency: opt_var("CURRENCY").unwrap_or_else(|| "INR".to_string()),
            pricing,
            gateway,
            nats_url: opt_var("NATS_URL"),
        })
    }
}

fn opt_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_i64(name: &str, default: i64) -> Result<i64> {
    match opt_var(name) {
        Some(v) => v
            .parse::<i64>()
            .with_context(|| format!("{} must be an integer", name)),
        None => Ok(default),
    }
}
