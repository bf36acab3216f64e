//! Stripe billing routes
//!
//! Thin JSON adapters over the billing services. All request bodies are
//! camelCase to match the front-end.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use stavitel_billing::{
    CheckoutResponse, CustomerSummary, PortalResponse, SessionDetails, SubscriptionSummary,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSubscriptionResponse {
    pub success: bool,
    pub customer: CustomerSummary,
    pub subscription: Option<SubscriptionSummary>,
}

/// Fetch a user's Stripe customer record and their active subscription
pub async fn check_subscription(
    State(state): State<AppState>,
    Json(req): Json<UserRequest>,
) -> ApiResult<Json<CheckSubscriptionResponse>> {
    if req.user_id.is_empty() {
        return Err(ApiError::BadRequest("userId is required".to_string()));
    }

    let (customer, subscription) = state.subscriptions.check_subscription(&req.user_id).await?;

    Ok(Json(CheckSubscriptionResponse {
        success: true,
        customer,
        subscription,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifySubscriptionResponse {
    pub success: bool,
    pub has_active_subscription: bool,
    pub subscription: Option<SubscriptionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Verify whether a user currently holds an active subscription
///
/// A customer without an active subscription is a normal answer (200 with
/// a message); a user with no Stripe customer at all is a 404.
pub async fn verify_subscription(
    State(state): State<AppState>,
    Json(req): Json<UserRequest>,
) -> ApiResult<Json<VerifySubscriptionResponse>> {
    if req.user_id.is_empty() {
        return Err(ApiError::BadRequest("userId is required".to_string()));
    }

    let subscription = state.subscriptions.verify_subscription(&req.user_id).await?;

    let message = subscription
        .is_none()
        .then(|| "No active subscription found".to_string());

    Ok(Json(VerifySubscriptionResponse {
        success: true,
        has_active_subscription: subscription.is_some(),
        subscription,
        message,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub user_id: String,
    pub price_id: String,
    pub customer_email: Option<String>,
}

/// Create a subscription checkout session
pub async fn create_checkout_session(
    State(state): State<AppState>,
    Json(req): Json<CreateCheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    if req.user_id.is_empty() || req.price_id.is_empty() {
        return Err(ApiError::BadRequest(
            "userId and priceId are required".to_string(),
        ));
    }

    let session = state
        .checkout
        .create_session(&req.user_id, &req.price_id, req.customer_email.as_deref())
        .await?;

    Ok(Json(session.into()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePortalRequest {
    pub user_id: String,
    pub customer_id: String,
}

/// Create a billing portal session for managing an existing subscription
pub async fn create_portal_session(
    State(state): State<AppState>,
    Json(req): Json<CreatePortalRequest>,
) -> ApiResult<Json<PortalResponse>> {
    if req.user_id.is_empty() || req.customer_id.is_empty() {
        return Err(ApiError::BadRequest(
            "userId and customerId are required".to_string(),
        ));
    }

    let session = state
        .portal
        .create_portal_session(&req.user_id, &req.customer_id)
        .await?;

    Ok(Json(session.into()))
}

// Query param stays snake_case: Stripe substitutes {CHECKOUT_SESSION_ID}
// into the success URL as ?session_id=
#[derive(Debug, Deserialize)]
pub struct SessionDetailsQuery {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetailsResponse {
    pub success: bool,
    #[serde(flatten)]
    pub details: SessionDetails,
}

/// Fetch a checkout session's outcome for the post-payment page
pub async fn get_session_details(
    State(state): State<AppState>,
    Query(query): Query<SessionDetailsQuery>,
) -> ApiResult<Json<SessionDetailsResponse>> {
    if query.session_id.is_empty() {
        return Err(ApiError::BadRequest("sessionId is required".to_string()));
    }

    let details = state.checkout.get_session_details(&query.session_id).await?;

    Ok(Json(SessionDetailsResponse {
        success: true,
        details,
    }))
}
