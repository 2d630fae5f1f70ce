use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use reqwest::Url;
use tracing::error;

use zip_db::Database;

use crate::error::ApiError;
use crate::storage::UploadSigner;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub checkout: CheckoutConfig,
    pub storage: Box<dyn UploadSigner>,
}

/// Test-mode Stripe payment link for the standard package.
pub const DEFAULT_PAYMENT_LINK: &str = "https://buy.stripe.com/test_5kQ9AT5uAgSmanX1NaejK00";

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Hosted payment link; the order id is appended as `client_reference_id`.
    pub payment_link: String,
    /// When set, webhook deliveries must carry a valid `Stripe-Signature`.
    pub webhook_secret: Option<String>,
    /// Serves `POST /verification/orders`, which records an order as paid
    /// without any payment confirmation.
    pub direct_orders_enabled: bool,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            payment_link: DEFAULT_PAYMENT_LINK.to_string(),
            webhook_secret: None,
            direct_orders_enabled: false,
        }
    }
}

/// Parse a hosted payment link. Only absolute http(s) URLs with a host pass.
pub fn parse_payment_link(link: &str) -> anyhow::Result<Url> {
    let url = Url::parse(link).with_context(|| format!("invalid payment link '{}'", link))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none_or(str::is_empty) {
        bail!("payment link must be an http(s) URL with a host, got '{}'", link);
    }
    Ok(url)
}

/// Run blocking DB work off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow!("blocking task failed: {}", e))
        })?
}
