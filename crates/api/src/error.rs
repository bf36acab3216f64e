//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use stavitel_billing::BillingError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient token allowance")]
    InsufficientTokens {
        tokens_used: i64,
        tokens_limit: i64,
        requested: i64,
    },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Unauthorized".to_string(),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::InsufficientTokens { .. } => (
                StatusCode::FORBIDDEN,
                "INSUFFICIENT_TOKENS",
                "Insufficient token allowance".to_string(),
            ),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        };

        let mut body = json!({
            "error": code,
            "message": message,
        });

        // The rejection carries the current figures so the client can render
        // an upgrade prompt
        if let ApiError::InsufficientTokens {
            tokens_used,
            tokens_limit,
            requested,
        } = &self
        {
            body["tokensUsed"] = json!(tokens_used);
            body["tokensLimit"] = json!(tokens_limit);
            body["requested"] = json!(requested);
        }

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::CustomerNotFound(msg) => {
                ApiError::NotFound(format!("No Stripe customer found for user: {}", msg))
            }
            BillingError::NoSubscription(msg) => {
                ApiError::NotFound(format!("No subscription found for user: {}", msg))
            }
            BillingError::InsufficientTokens {
                used,
                limit,
                requested,
            } => ApiError::InsufficientTokens {
                tokens_used: used,
                tokens_limit: limit,
                requested,
            },
            BillingError::Unauthorized(msg) => ApiError::Forbidden(msg),
            BillingError::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => {
                tracing::error!(error = %other, "Billing operation failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        ApiError::Internal("Database error".to_string())
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_insufficient_tokens_echoes_figures() {
        let (status, body) = body_json(ApiError::InsufficientTokens {
            tokens_used: 90_000,
            tokens_limit: 100_000,
            requested: 20_000,
        })
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "INSUFFICIENT_TOKENS");
        assert_eq!(body["tokensUsed"], 90_000);
        assert_eq!(body["tokensLimit"], 100_000);
        assert_eq!(body["requested"], 20_000);
    }

    #[tokio::test]
    async fn test_not_found_status() {
        let (status, body) = body_json(ApiError::NotFound("no such thing".to_string())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }
}
