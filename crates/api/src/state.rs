//! Shared application state
//!
//! Every external client is constructed once in `main` and injected here;
//! handlers never reach for globals.

use std::sync::Arc;

use sqlx::PgPool;
use stavitel_billing::{
    CheckoutService, PortalService, ReconciliationService, StripeClient, SubscriptionService,
    TokenLedger,
};

use crate::config::Config;
use crate::routes::github::GithubClient;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub subscriptions: SubscriptionService,
    pub reconciliation: ReconciliationService,
    pub tokens: TokenLedger,
    pub checkout: CheckoutService,
    pub portal: PortalService,
    pub github: GithubClient,
}

impl AppState {
    pub fn new(config: Config, stripe: StripeClient, pool: PgPool) -> Self {
        let github = GithubClient::new(config.github_api_base.clone());
        Self {
            subscriptions: SubscriptionService::new(stripe.clone(), pool.clone()),
            reconciliation: ReconciliationService::new(stripe.clone(), pool.clone()),
            tokens: TokenLedger::new(pool.clone()),
            checkout: CheckoutService::new(stripe.clone(), pool.clone()),
            portal: PortalService::new(stripe, pool.clone()),
            github,
            config: Arc::new(config),
            pool,
        }
    }
}
