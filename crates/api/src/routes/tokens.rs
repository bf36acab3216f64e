//! Token consumption endpoints
//!
//! `consume_tokens` is the authoritative gate: the increment and the limit
//! check happen in a single guarded UPDATE, so two concurrent generations
//! can never push a user past their allowance. `validate_tokens` is a
//! stateless preview for clients that want to check before generating.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use stavitel_billing::validate_usage;
use stavitel_shared::{Plan, UserSubscription};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeTokensRequest {
    pub user_id: String,
    pub tokens: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeTokensResponse {
    pub success: bool,
    pub subscription: UserSubscription,
}

/// Atomically consume tokens from the user's monthly allowance
pub async fn consume_tokens(
    State(state): State<AppState>,
    Json(req): Json<ConsumeTokensRequest>,
) -> ApiResult<Json<ConsumeTokensResponse>> {
    if req.user_id.is_empty() {
        return Err(ApiError::BadRequest("userId is required".to_string()));
    }

    let subscription = state.tokens.consume(&req.user_id, req.tokens).await?;

    Ok(Json(ConsumeTokensResponse {
        success: true,
        subscription,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokensRequest {
    pub plan: String,
    pub tokens_used: i64,
    pub tokens_limit: i64,
    pub requested_tokens: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokensResponse {
    pub success: bool,
    pub approved: bool,
    pub new_tokens_used: i64,
}

/// Check whether a usage amount would fit within the given allowance.
///
/// Purely advisory: nothing is persisted. A request that does not fit is
/// rejected with 403 carrying the reported figures, mirroring the consume
/// path.
pub async fn validate_tokens(
    Json(req): Json<ValidateTokensRequest>,
) -> ApiResult<Json<ValidateTokensResponse>> {
    let plan: Plan = req
        .plan
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Unknown plan: {}", req.plan)))?;

    if req.requested_tokens < 0 {
        return Err(ApiError::BadRequest(
            "requestedTokens must not be negative".to_string(),
        ));
    }

    let decision = validate_usage(plan, req.tokens_used, req.tokens_limit, req.requested_tokens);

    if !decision.approved {
        return Err(ApiError::InsufficientTokens {
            tokens_used: req.tokens_used,
            tokens_limit: req.tokens_limit,
            requested: req.requested_tokens,
        });
    }

    Ok(Json(ValidateTokensResponse {
        success: true,
        approved: true,
        new_tokens_used: decision.new_tokens_used,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request(plan: &str, tokens_used: i64, tokens_limit: i64, requested: i64) -> ValidateTokensRequest {
        ValidateTokensRequest {
            plan: plan.to_string(),
            tokens_used,
            tokens_limit,
            requested_tokens: requested,
        }
    }

    #[tokio::test]
    async fn test_validate_within_limit_approves() {
        let response = validate_tokens(Json(request("business", 10, 100, 50)))
            .await
            .unwrap();
        assert!(response.0.approved);
        assert_eq!(response.0.new_tokens_used, 60);
    }

    #[tokio::test]
    async fn test_validate_over_limit_is_forbidden() {
        let err = validate_tokens(Json(request("professional", 90_000, 100_000, 20_000)))
            .await
            .unwrap_err();

        match err {
            ApiError::InsufficientTokens {
                tokens_used,
                tokens_limit,
                requested,
            } => {
                assert_eq!(tokens_used, 90_000);
                assert_eq!(tokens_limit, 100_000);
                assert_eq!(requested, 20_000);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validate_unknown_plan_is_bad_request() {
        let err = validate_tokens(Json(request("platinum", 0, 100, 10)))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
