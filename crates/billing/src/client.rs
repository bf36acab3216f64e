//! Stripe client configuration and the plan catalog

use stavitel_shared::Plan;
use stripe::Client;

use crate::error::{BillingError, BillingResult};

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Price IDs for each plan
    pub price_ids: PriceIds,
    /// Base URL for success/cancel redirects
    pub app_base_url: String,
}

/// Stripe price IDs for web plans and content plans
/// Plan ladder: Trial → Starter → Professional → Business → Unlimited
#[derive(Debug, Clone)]
pub struct PriceIds {
    // Web plans (monthly)
    pub starter: String,
    pub professional: String,
    pub business: String,
    pub unlimited: String,

    // Trial offer (optional; some deployments grant trials without a price)
    pub trial: Option<String>,

    // Legacy plan still live on old subscriptions
    pub pro: Option<String>,

    // Content add-on plans
    pub content_basic: Option<String>,
    pub content_pro: Option<String>,
    pub content_business: Option<String>,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            price_ids: PriceIds {
                starter: std::env::var("STRIPE_PRICE_STARTER")
                    .map_err(|_| BillingError::Config("STRIPE_PRICE_STARTER not set".to_string()))?,
                professional: std::env::var("STRIPE_PRICE_PROFESSIONAL").map_err(|_| {
                    BillingError::Config("STRIPE_PRICE_PROFESSIONAL not set".to_string())
                })?,
                business: std::env::var("STRIPE_PRICE_BUSINESS").map_err(|_| {
                    BillingError::Config("STRIPE_PRICE_BUSINESS not set".to_string())
                })?,
                unlimited: std::env::var("STRIPE_PRICE_UNLIMITED").map_err(|_| {
                    BillingError::Config("STRIPE_PRICE_UNLIMITED not set".to_string())
                })?,

                trial: std::env::var("STRIPE_PRICE_TRIAL").ok(),
                pro: std::env::var("STRIPE_PRICE_PRO").ok(),

                content_basic: std::env::var("STRIPE_PRICE_CONTENT_BASIC").ok(),
                content_pro: std::env::var("STRIPE_PRICE_CONTENT_PRO").ok(),
                content_business: std::env::var("STRIPE_PRICE_CONTENT_BUSINESS").ok(),
            },
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }

    /// Resolve a Stripe price ID to a plan
    ///
    /// Total: price IDs not present in the catalog resolve to `Starter`.
    /// Subscriptions sold under prices that were later rotated out of the
    /// environment would otherwise fail to resolve at all.
    pub fn resolve_plan(&self, price_id: &str) -> Plan {
        let ids = &self.price_ids;
        if price_id == ids.starter {
            Plan::Starter
        } else if price_id == ids.professional {
            Plan::Professional
        } else if price_id == ids.business {
            Plan::Business
        } else if price_id == ids.unlimited {
            Plan::Unlimited
        } else if ids.trial.as_deref() == Some(price_id) {
            Plan::Trial
        } else if ids.pro.as_deref() == Some(price_id) {
            Plan::Pro
        } else if ids.content_basic.as_deref() == Some(price_id) {
            Plan::ContentBasic
        } else if ids.content_pro.as_deref() == Some(price_id) {
            Plan::ContentPro
        } else if ids.content_business.as_deref() == Some(price_id) {
            Plan::ContentBusiness
        } else {
            Plan::Starter
        }
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_x".to_string(),
            price_ids: PriceIds {
                starter: "price_starter".to_string(),
                professional: "price_professional".to_string(),
                business: "price_business".to_string(),
                unlimited: "price_unlimited".to_string(),
                trial: Some("price_trial".to_string()),
                pro: Some("price_pro_legacy".to_string()),
                content_basic: Some("price_content_basic".to_string()),
                content_pro: Some("price_content_pro".to_string()),
                content_business: None,
            },
            app_base_url: "http://localhost:3000".to_string(),
        }
    }

    #[test]
    fn test_resolve_known_prices() {
        let config = test_config();
        assert_eq!(config.resolve_plan("price_professional"), Plan::Professional);
        assert_eq!(config.resolve_plan("price_unlimited"), Plan::Unlimited);
        assert_eq!(config.resolve_plan("price_trial"), Plan::Trial);
        assert_eq!(config.resolve_plan("price_pro_legacy"), Plan::Pro);
        assert_eq!(config.resolve_plan("price_content_pro"), Plan::ContentPro);
    }

    #[test]
    fn test_unknown_price_falls_back_to_starter() {
        let config = test_config();
        assert_eq!(config.resolve_plan("price_never_seen"), Plan::Starter);
        assert_eq!(config.resolve_plan(""), Plan::Starter);
        // Unconfigured optional prices must not match their plan
        assert_eq!(config.resolve_plan("price_content_business"), Plan::Starter);
    }
}
