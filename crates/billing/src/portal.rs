//! Stripe Billing Portal

use sqlx::PgPool;
use stripe::{BillingPortalSession, CreateBillingPortalSession, CustomerId};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Portal service for Stripe billing portal sessions
#[derive(Clone)]
pub struct PortalService {
    stripe: StripeClient,
    pool: PgPool,
}

impl PortalService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Create a billing portal session for a user's customer
    ///
    /// The caller supplies both the user and the customer id; the pair is
    /// checked against the index so one user cannot open another user's
    /// billing portal.
    pub async fn create_portal_session(
        &self,
        user_id: &str,
        customer_id: &str,
    ) -> BillingResult<BillingPortalSession> {
        let indexed: Option<(String,)> =
            sqlx::query_as("SELECT customer_id FROM stripe_customers WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        match indexed {
            None => return Err(BillingError::CustomerNotFound(user_id.to_string())),
            Some((expected,)) if expected != customer_id => {
                tracing::warn!(
                    user_id = %user_id,
                    customer_id = %customer_id,
                    "Customer ID ownership verification failed"
                );
                return Err(BillingError::Unauthorized(
                    "Customer ID does not belong to this user".to_string(),
                ));
            }
            Some(_) => {}
        }

        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let return_url = format!("{}/ucet", self.stripe.config().app_base_url);

        let mut params = CreateBillingPortalSession::new(customer_id);
        params.return_url = Some(&return_url);

        let session = BillingPortalSession::create(self.stripe.inner(), params).await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %session.customer,
            "Created billing portal session"
        );

        Ok(session)
    }
}

/// Response for creating a portal session
#[derive(Debug, serde::Serialize)]
pub struct PortalResponse {
    pub url: String,
}

impl From<BillingPortalSession> for PortalResponse {
    fn from(session: BillingPortalSession) -> Self {
        Self { url: session.url }
    }
}
