//! Application State

use std::sync::Arc;

use admitdb_core::{AccessPolicy, MemoryStore, OrderStore, ProductStore, UserStore};
use admitdb_payments::{CheckoutOrchestrator, FulfillmentHandler, PaymentGateway};
use admitdb_pricing::{Catalog, PriceResolver, PricingPolicy};

use crate::config::{EnvironmentFlags, ServerConfig};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Plan pricing and coupons
    pub resolver: Arc<PriceResolver>,

    /// Plan -> capability table for the admin user view
    pub access: Arc<AccessPolicy>,

    pub orders: Arc<dyn OrderStore>,
    pub users: Arc<dyn UserStore>,
    pub products: Arc<dyn ProductStore>,

    /// Payment gateway (optional - None if not configured)
    pub gateway: Option<Arc<dyn PaymentGateway>>,

    /// Present exactly when `gateway` is
    pub checkout: Option<Arc<CheckoutOrchestrator>>,

    pub fulfillment: Arc<FulfillmentHandler>,

    /// Startup status reported by `/health`
    pub status: ServiceStatus,

    /// Bearer token guarding `/api/admin/*`
    pub admin_token: Option<Arc<str>>,
}

/// What came up at startup
#[derive(Clone, Copy, Debug)]
pub struct ServiceStatus {
    pub gateway_name: Option<&'static str>,
    pub store_initialized: bool,
    pub environment: EnvironmentFlags,
}

impl AppState {
    /// Wire every component around one store and an optional gateway
    pub fn build(
        config: &ServerConfig,
        catalog: Catalog,
        store: Arc<MemoryStore>,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> admitdb_pricing::Result<Self> {
        let catalog = Arc::new(catalog);
        let resolver = Arc::new(PriceResolver::new(
            catalog.clone(),
            PricingPolicy::with_floor(config.minimum_charge),
        )?);
        let fulfillment = Arc::new(FulfillmentHandler::new(
            store.clone(),
            store.clone(),
            catalog.clone(),
        ));

        let checkout = gateway.as_ref().map(|gateway| {
            Arc::new(
                CheckoutOrchestrator::new(
                    resolver.clone(),
                    store.clone(),
                    gateway.clone(),
                    fulfillment.clone(),
                )
                .with_timeout(config.gateway_timeout),
            )
        });

        Ok(Self {
            access: Arc::new(catalog.access_policy()),
            resolver,
            orders: store.clone(),
            users: store.clone(),
            products: store,
            status: ServiceStatus {
                gateway_name: gateway.as_ref().map(|g| g.name()),
                store_initialized: true,
                environment: config.environment_flags(),
            },
            gateway,
            checkout,
            fulfillment,
            admin_token: config.admin_api_token.as_deref().map(Arc::from),
        })
    }
}
