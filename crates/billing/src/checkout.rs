//! Stripe Checkout sessions

use std::collections::HashMap;

use serde::Serialize;
use sqlx::PgPool;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CheckoutSessionPaymentStatus, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CustomerId,
};

use crate::client::StripeClient;
use crate::customer::CustomerService;
use crate::error::{BillingError, BillingResult};

/// Checkout service for creating Stripe checkout sessions
#[derive(Clone)]
pub struct CheckoutService {
    stripe: StripeClient,
    pool: PgPool,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Create a subscription checkout session for a user
    ///
    /// The customer is looked up in the index, or created with the user ID
    /// stamped in metadata so reconciliation can always trace it back.
    pub async fn create_session(
        &self,
        user_id: &str,
        price_id: &str,
        customer_email: Option<&str>,
    ) -> BillingResult<CheckoutSession> {
        let customers = CustomerService::new(self.stripe.clone(), self.pool.clone());
        let customer_id = customers.get_or_create_customer(user_id, customer_email).await?;
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let plan = self.stripe.config().resolve_plan(price_id);

        let base_url = &self.stripe.config().app_base_url;
        let success_url = format!(
            "{}/platba/uspech?session_id={{CHECKOUT_SESSION_ID}}",
            base_url
        );
        let cancel_url = format!("{}/platba/zruseno", base_url);

        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), user_id.to_string());
        metadata.insert("plan".to_string(), plan.to_string());

        let params = CreateCheckoutSession {
            customer: Some(customer_id),
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(vec![CreateCheckoutSessionLineItems {
                price: Some(price_id.to_string()),
                quantity: Some(1),
                ..Default::default()
            }]),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata),
            allow_promotion_codes: Some(true),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            plan = %plan,
            "Created checkout session"
        );

        Ok(session)
    }

    /// Retrieve a checkout session and summarize it for the front-end
    pub async fn get_session_details(&self, session_id: &str) -> BillingResult<SessionDetails> {
        let session_id = session_id
            .parse::<stripe::CheckoutSessionId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid session ID: {}", e)))?;

        let session = CheckoutSession::retrieve(self.stripe.inner(), &session_id, &[]).await?;
        Ok(SessionDetails::from_session(&session))
    }
}

/// Response for creating a checkout session
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: Option<String>,
}

impl From<CheckoutSession> for CheckoutResponse {
    fn from(session: CheckoutSession) -> Self {
        Self {
            session_id: session.id.to_string(),
            url: session.url,
        }
    }
}

/// Summary of a completed (or pending) checkout session
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetails {
    pub session_id: String,
    pub payment_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<stavitel_shared::Plan>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
}

impl SessionDetails {
    fn from_session(session: &CheckoutSession) -> Self {
        let plan = session
            .metadata
            .as_ref()
            .and_then(|m| m.get("plan"))
            .and_then(|p| p.parse().ok());

        Self {
            session_id: session.id.to_string(),
            payment_status: payment_status_str(session.payment_status).to_string(),
            plan,
            amount: session.amount_total,
            currency: session.currency.map(|c| c.to_string()),
            customer_email: session
                .customer_details
                .as_ref()
                .and_then(|d| d.email.clone()),
        }
    }
}

fn payment_status_str(status: CheckoutSessionPaymentStatus) -> &'static str {
    match status {
        CheckoutSessionPaymentStatus::Paid => "paid",
        CheckoutSessionPaymentStatus::Unpaid => "unpaid",
        CheckoutSessionPaymentStatus::NoPaymentRequired => "no_payment_required",
    }
}
