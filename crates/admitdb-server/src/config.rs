//! Server Configuration
//!
//! Everything is read from the process environment (after `.env` is
//! loaded). Missing payment credentials are not fatal: the server starts
//! and the payment endpoints answer 503.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;

/// Origins allowed when `ALLOWED_ORIGINS` is unset
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
    "https://admitdb.com",
    "https://www.admitdb.com",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} has an invalid value: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Which payment gateway to wire up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatewayKind {
    Stripe,
    /// In-process gateway for local development
    Mock,
}

/// Document-store service-account credentials
#[derive(Clone, Debug, Default)]
pub struct StoreCredentials {
    pub project_id: Option<String>,
    pub client_email: Option<String>,
    pub private_key: Option<String>,
}

impl StoreCredentials {
    pub const fn is_complete(&self) -> bool {
        self.project_id.is_some() && self.client_email.is_some() && self.private_key.is_some()
    }
}

/// Process configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub gateway: GatewayKind,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub store: StoreCredentials,
    pub gateway_timeout: Duration,
    pub catalog_path: Option<PathBuf>,
    /// Minimum chargeable amount in dollars
    pub minimum_charge: Decimal,
    pub admin_api_token: Option<String>,
}

impl ServerConfig {
    /// Read from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through `lookup`; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let gateway = match get("PAYMENT_GATEWAY").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("stripe") => GatewayKind::Stripe,
            Some("mock") => GatewayKind::Mock,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "PAYMENT_GATEWAY",
                    value: other.to_string(),
                });
            }
        };

        let allowed_origins = get("ALLOWED_ORIGINS").map_or_else(
            || DEFAULT_ALLOWED_ORIGINS.iter().map(ToString::to_string).collect(),
            |list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            },
        );

        Ok(Self {
            bind_host: get("BIND_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(get("PORT"), "PORT", 3000)?,
            allowed_origins,
            gateway,
            stripe_secret_key: get("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: get("STRIPE_WEBHOOK_SECRET"),
            store: StoreCredentials {
                project_id: get("STORE_PROJECT_ID"),
                client_email: get("STORE_CLIENT_EMAIL"),
                private_key: get("STORE_PRIVATE_KEY"),
            },
            gateway_timeout: gateway_timeout(get("GATEWAY_TIMEOUT_SECS"))?,
            catalog_path: get("CATALOG_PATH").map(PathBuf::from),
            minimum_charge: parse_or(get("MINIMUM_CHARGE"), "MINIMUM_CHARGE", Decimal::ZERO)?,
            admin_api_token: get("ADMIN_API_TOKEN"),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// Presence flags reported by `/health`; values are never echoed
    pub fn environment_flags(&self) -> EnvironmentFlags {
        EnvironmentFlags {
            stripe_secret_key: self.stripe_secret_key.is_some(),
            stripe_webhook_secret: self.stripe_webhook_secret.is_some(),
            store_project_id: self.store.project_id.is_some(),
            store_client_email: self.store.client_email.is_some(),
            store_private_key: self.store.private_key.is_some(),
        }
    }
}

/// Which configuration values are present
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentFlags {
    pub stripe_secret_key: bool,
    pub stripe_webhook_secret: bool,
    pub store_project_id: bool,
    pub store_client_email: bool,
    pub store_private_key: bool,
}

/// A zero timeout would fail every paid checkout
fn gateway_timeout(raw: Option<String>) -> Result<Duration, ConfigError> {
    match parse_or(raw, "GATEWAY_TIMEOUT_SECS", 10)? {
        0 => Err(ConfigError::Invalid {
            var: "GATEWAY_TIMEOUT_SECS",
            value: "0".into(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:3000");
        assert_eq!(cfg.gateway, GatewayKind::Stripe);
        assert_eq!(cfg.gateway_timeout, Duration::from_secs(10));
        assert_eq!(cfg.minimum_charge, Decimal::ZERO);
        assert_eq!(cfg.allowed_origins.len(), DEFAULT_ALLOWED_ORIGINS.len());
        assert!(cfg.stripe_secret_key.is_none());
        assert_eq!(cfg.environment_flags(), EnvironmentFlags::default());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("PORT", "8080"),
            ("PAYMENT_GATEWAY", "Mock"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
            ("MINIMUM_CHARGE", "0.50"),
            ("STRIPE_SECRET_KEY", "sk_test_1"),
            ("STORE_PROJECT_ID", "admitdb-prod"),
            ("ADMIN_API_TOKEN", "  "),
        ])
        .unwrap();

        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.gateway, GatewayKind::Mock);
        assert_eq!(cfg.allowed_origins, vec!["https://a.example", "https://b.example"]);
        assert_eq!(cfg.minimum_charge, Decimal::new(50, 2));
        assert!(cfg.admin_api_token.is_none());

        let flags = cfg.environment_flags();
        assert!(flags.stripe_secret_key);
        assert!(!flags.stripe_webhook_secret);
        assert!(flags.store_project_id);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("PORT", "eighty")]),
            Err(ConfigError::Invalid { var: "PORT", .. })
        ));
        assert!(config(&[("PAYMENT_GATEWAY", "paypal")]).is_err());
        assert!(config(&[("GATEWAY_TIMEOUT_SECS", "-1")]).is_err());
    }

    #[test]
    fn test_zero_gateway_timeout_rejected() {
        assert!(matches!(
            config(&[("GATEWAY_TIMEOUT_SECS", "0")]),
            Err(ConfigError::Invalid { var: "GATEWAY_TIMEOUT_SECS", .. })
        ));
        let cfg = config(&[("GATEWAY_TIMEOUT_SECS", "3")]).unwrap();
        assert_eq!(cfg.gateway_timeout, Duration::from_secs(3));
    }
}
