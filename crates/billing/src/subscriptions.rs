//! Subscription lookup and verification

use serde::Serialize;
use sqlx::PgPool;
use stripe::{
    Customer, CustomerId, ListSubscriptions, Subscription, SubscriptionStatus,
    SubscriptionStatusFilter,
};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Upper bound on active subscriptions fetched per customer
const ACTIVE_SUB_LIMIT: u64 = 10;

/// Condensed view of a Stripe subscription with the plan resolved
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub subscription_id: String,
    pub customer_id: String,
    pub status: String,
    pub plan: stavitel_shared::Plan,
    pub price_id: Option<String>,
    /// Unix timestamp of the current billing period end
    pub current_period_end: i64,
}

/// Condensed view of a Stripe customer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub customer_id: String,
    pub email: Option<String>,
    pub created: Option<i64>,
}

/// Subscription service for querying Stripe subscription state
#[derive(Clone)]
pub struct SubscriptionService {
    stripe: StripeClient,
    pool: PgPool,
}

impl SubscriptionService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// List a customer's active subscriptions (bounded)
    pub async fn list_active_subscriptions(
        &self,
        customer_id: &str,
    ) -> BillingResult<Vec<Subscription>> {
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let mut params = ListSubscriptions::new();
        params.customer = Some(customer_id);
        params.status = Some(SubscriptionStatusFilter::Active);
        params.limit = Some(ACTIVE_SUB_LIMIT);

        let subscriptions = Subscription::list(self.stripe.inner(), &params).await?;
        Ok(subscriptions.data)
    }

    /// Whether a customer holds at least one active subscription
    pub async fn has_active_subscription(&self, customer_id: &str) -> BillingResult<bool> {
        let customer_id_parsed = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let mut params = ListSubscriptions::new();
        params.customer = Some(customer_id_parsed);
        params.status = Some(SubscriptionStatusFilter::Active);
        params.limit = Some(1);

        let subscriptions = Subscription::list(self.stripe.inner(), &params).await?;
        Ok(!subscriptions.data.is_empty())
    }

    /// Summarize a subscription, resolving its plan via the price catalog
    ///
    /// When a customer holds several active subscriptions the first one in
    /// Stripe's listing is treated as authoritative.
    pub fn summarize(&self, subscription: &Subscription) -> SubscriptionSummary {
        let price_id = subscription
            .items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|p| p.id.to_string());

        let plan = price_id
            .as_deref()
            .map(|id| self.stripe.config().resolve_plan(id))
            .unwrap_or_default();

        SubscriptionSummary {
            subscription_id: subscription.id.to_string(),
            customer_id: subscription.customer.id().to_string(),
            status: subscription_status_str(subscription.status).to_string(),
            plan,
            price_id,
            current_period_end: subscription.current_period_end,
        }
    }

    /// Verify a user's subscription via the customer index
    ///
    /// Returns the summary of the user's first active subscription, or
    /// `Ok(None)` when the customer exists but has no active subscription.
    /// Errors with `CustomerNotFound` when the user has no indexed customer.
    pub async fn verify_subscription(
        &self,
        user_id: &str,
    ) -> BillingResult<Option<SubscriptionSummary>> {
        let customer_id = self
            .indexed_customer_id(user_id)
            .await?
            .ok_or_else(|| BillingError::CustomerNotFound(user_id.to_string()))?;

        let subscriptions = self.list_active_subscriptions(&customer_id).await?;
        Ok(subscriptions.first().map(|s| self.summarize(s)))
    }

    /// Fetch a user's customer record plus their first active subscription
    pub async fn check_subscription(
        &self,
        user_id: &str,
    ) -> BillingResult<(CustomerSummary, Option<SubscriptionSummary>)> {
        let customer_id = self
            .indexed_customer_id(user_id)
            .await?
            .ok_or_else(|| BillingError::CustomerNotFound(user_id.to_string()))?;

        let customer_id_parsed = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;
        let customer = Customer::retrieve(self.stripe.inner(), &customer_id_parsed, &[]).await?;

        let summary = CustomerSummary {
            customer_id: customer.id.to_string(),
            email: customer.email.clone(),
            created: customer.created,
        };

        let subscriptions = self.list_active_subscriptions(&customer_id).await?;
        Ok((summary, subscriptions.first().map(|s| self.summarize(s))))
    }

    async fn indexed_customer_id(&self, user_id: &str) -> BillingResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT customer_id FROM stripe_customers WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }
}

/// Stable string form of a Stripe subscription status
pub fn subscription_status_str(status: SubscriptionStatus) -> &'static str {
    match status {
        SubscriptionStatus::Active => "active",
        SubscriptionStatus::Canceled => "canceled",
        SubscriptionStatus::Incomplete => "incomplete",
        SubscriptionStatus::IncompleteExpired => "incomplete_expired",
        SubscriptionStatus::PastDue => "past_due",
        SubscriptionStatus::Paused => "paused",
        SubscriptionStatus::Trialing => "trialing",
        SubscriptionStatus::Unpaid => "unpaid",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        assert_eq!(subscription_status_str(SubscriptionStatus::Active), "active");
        assert_eq!(
            subscription_status_str(SubscriptionStatus::IncompleteExpired),
            "incomplete_expired"
        );
        assert_eq!(subscription_status_str(SubscriptionStatus::Unpaid), "unpaid");
    }
}
