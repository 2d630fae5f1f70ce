use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use zip_api::CheckoutConfig;
use zip_api::state::{DEFAULT_PAYMENT_LINK, parse_payment_link};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-in-production", "dev-secret-change-me"];

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub cors_origins: Vec<String>,
    pub checkout: CheckoutConfig,
    pub supabase: Option<SupabaseConfig>,
}

pub struct SupabaseConfig {
    pub url: String,
    pub service_role_key: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = var("ZIP_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("ZIP_JWT_SECRET is unset or still a placeholder");
        }

        let port = match var("ZIP_PORT") {
            Some(raw) => raw.parse().with_context(|| format!("invalid ZIP_PORT '{}'", raw))?,
            None => 4000,
        };

        let cors_origins = var("ZIP_CORS_ORIGIN")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGIN.into())
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        let payment_link = var("STRIPE_STANDARD_PAYMENT_LINK").unwrap_or_else(|| DEFAULT_PAYMENT_LINK.into());
        parse_payment_link(&payment_link).context("STRIPE_STANDARD_PAYMENT_LINK")?;

        let direct_orders_enabled = match var("ZIP_DIRECT_ORDERS_ENABLED").as_deref() {
            None => false,
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            Some(other) => bail!("invalid ZIP_DIRECT_ORDERS_ENABLED '{}'", other),
        };

        let supabase = match (var("SUPABASE_URL"), var("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_role_key)) => Some(SupabaseConfig { url, service_role_key }),
            (None, None) => None,
            _ => bail!("SUPABASE_URL and SUPABASE_SERVICE_ROLE_KEY must be set together"),
        };

        Ok(Self {
            host: var("ZIP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: var("ZIP_DB_PATH").unwrap_or_else(|| "zip.db".into()).into(),
            jwt_secret,
            cors_origins,
            checkout: CheckoutConfig {
                payment_link,
                webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
                direct_orders_enabled,
            },
            supabase,
        })
    }

    /// Log the settings that change request handling.
    pub fn log_summary(&self) {
        info!("Database: {}", self.db_path.display());
        info!("CORS origins: {}", self.cors_origins.join(", "));
        if self.checkout.webhook_secret.is_none() {
            warn!("STRIPE_WEBHOOK_SECRET not set; webhook signatures will NOT be verified");
        }
        if self.checkout.direct_orders_enabled {
            warn!("Direct verification orders are enabled; orders are recorded as paid without payment");
        }
        if self.supabase.is_none() {
            warn!("Object storage not configured; upload URLs will fail");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_with_only_a_secret() {
        let config = load(&[("ZIP_JWT_SECRET", "a-real-secret")]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 4000);
        assert_eq!(config.db_path, PathBuf::from("zip.db"));
        assert_eq!(config.cors_origins, vec!["http://localhost:3000".to_string()]);
        assert_eq!(config.checkout.payment_link, DEFAULT_PAYMENT_LINK);
        assert!(config.checkout.webhook_secret.is_none());
        assert!(!config.checkout.direct_orders_enabled);
        assert!(config.supabase.is_none());
    }

    #[test]
    fn placeholder_or_missing_secret_is_fatal() {
        assert!(load(&[]).is_err());
        assert!(load(&[("ZIP_JWT_SECRET", "change-me-in-production")]).is_err());
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("ZIP_JWT_SECRET", "a-real-secret"),
            ("ZIP_PORT", "8080"),
            ("ZIP_CORS_ORIGIN", "https://zip.example, https://admin.zip.example"),
            ("ZIP_DIRECT_ORDERS_ENABLED", "true"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_123"),
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_SERVICE_ROLE_KEY", "service-key"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.cors_origins[1], "https://admin.zip.example");
        assert!(config.checkout.direct_orders_enabled);
        assert_eq!(config.checkout.webhook_secret.as_deref(), Some("whsec_123"));
        assert_eq!(config.supabase.unwrap().url, "https://abc.supabase.co");
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(load(&[("ZIP_JWT_SECRET", "s"), ("ZIP_PORT", "eighty")]).is_err());
        assert!(load(&[("ZIP_JWT_SECRET", "s"), ("ZIP_DIRECT_ORDERS_ENABLED", "yes please")]).is_err());
        assert!(load(&[("ZIP_JWT_SECRET", "s"), ("SUPABASE_URL", "https://abc.supabase.co")]).is_err());
        assert!(load(&[("ZIP_JWT_SECRET", "s"), ("STRIPE_STANDARD_PAYMENT_LINK", "buy.stripe.com/x")]).is_err());
        assert!(load(&[("ZIP_JWT_SECRET", "s"), ("STRIPE_STANDARD_PAYMENT_LINK", "https://")]).is_err());
    }
}
