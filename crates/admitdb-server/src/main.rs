//! admitdb HTTP Server
//!
//! Axum-based server for checkout, payment webhooks, user accounts and the
//! admin API.
//!
//! Payment credentials are optional at startup: without them the server
//! still serves `/health`, plans and quotes, and the payment endpoints
//! answer 503.

mod admin;
mod app;
mod config;
mod handlers;
mod state;
mod users;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use admitdb_core::MemoryStore;
use admitdb_payments::{MockGateway, PaymentGateway, StripeGateway};
use admitdb_pricing::Catalog;

use crate::app::build_router;
use crate::config::{GatewayKind, ServerConfig};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = ServerConfig::from_env()?;

    // Plan catalog
    let catalog = match &config.catalog_path {
        Some(path) => Catalog::load(path)?,
        None => {
            tracing::info!("Using built-in sample catalog");
            Catalog::sample()
        }
    };
    for plan in catalog.active_plans() {
        tracing::info!("  Plan: {} ({}) ${}", plan.id, plan.name, plan.price);
    }

    // Document store
    if !config.store.is_complete() {
        tracing::warn!("⚠ Store credentials incomplete - using in-memory store");
        tracing::warn!("  Set STORE_PROJECT_ID, STORE_CLIENT_EMAIL and STORE_PRIVATE_KEY in .env");
    }
    let store = Arc::new(MemoryStore::new());

    // Payment gateway
    let gateway = init_gateway(&config);

    let state = AppState::build(&config, catalog, store, gateway)?;
    let app = build_router(state, &config);

    // Start server
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 admitdb server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                     - Health check");
    tracing::info!("  GET  /api/plans                  - List plans");
    tracing::info!("  POST /api/quote                  - Price preview");
    tracing::info!("  POST /api/create-payment-intent  - Start checkout");
    tracing::info!("  POST /webhook                    - Payment webhook");
    tracing::info!("  POST /api/users                  - Sign up");
    tracing::info!("  *    /api/users/{{id}}/...         - Addresses & payment methods");
    tracing::info!("  *    /api/admin/...              - Admin API (bearer token)");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_gateway(config: &ServerConfig) -> Option<Arc<dyn PaymentGateway>> {
    match config.gateway {
        GatewayKind::Mock => {
            tracing::warn!("⚠ Using mock payment gateway - no real charges");
            let gateway = config
                .stripe_webhook_secret
                .as_deref()
                .map_or_else(MockGateway::new, MockGateway::with_secret);
            Some(Arc::new(gateway))
        }
        GatewayKind::Stripe => {
            match (&config.stripe_secret_key, &config.stripe_webhook_secret) {
                (Some(secret_key), Some(webhook_secret)) => {
                    tracing::info!("✓ Stripe configured");
                    Some(Arc::new(StripeGateway::new(secret_key, webhook_secret)))
                }
                _ => {
                    tracing::warn!("⚠ Stripe not configured - payments disabled");
                    tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
                    None
                }
            }
        }
    }
}
