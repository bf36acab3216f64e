//! API routes

pub mod admin;
pub mod github;
pub mod health;
pub mod stripe;
pub mod tokens;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

/// Create all API routes
///
/// CORS is fully open: the front-end is served from a different origin and
/// every handler speaks plain JSON. Preflight OPTIONS requests are answered
/// by the CORS layer.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        // Token consumption gate
        .route("/api/consume-tokens", post(tokens::consume_tokens))
        .route("/api/validate-tokens", post(tokens::validate_tokens))
        // Stripe billing
        .route(
            "/api/stripe/check-subscription",
            post(stripe::check_subscription),
        )
        .route(
            "/api/stripe/verify-subscription",
            post(stripe::verify_subscription),
        )
        .route(
            "/api/stripe/create-checkout-session",
            post(stripe::create_checkout_session),
        )
        .route(
            "/api/stripe/create-portal-session",
            post(stripe::create_portal_session),
        )
        .route(
            "/api/stripe/get-session-details",
            get(stripe::get_session_details),
        )
        // Admin reconciliation
        .route("/api/admin/fix-credits", post(admin::fix_credits))
        .route(
            "/api/admin/fix-stripe-customers",
            post(admin::fix_stripe_customers),
        )
        .route(
            "/api/admin/manual-fix-stripe",
            post(admin::manual_fix_stripe),
        )
        // GitHub content proxy
        .route(
            "/api/github/repos",
            get(github::list_repos).post(github::create_repo),
        )
        .route("/api/github/contents", put(github::put_contents))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use stavitel_billing::{PriceIds, StripeClient, StripeConfig};
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;

    // State backed by a pool that never connects; handlers that reach the
    // database fail fast with a 500 instead of hanging the test.
    fn offline_state() -> AppState {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy("postgres://stavitel@127.0.0.1:1/stavitel")
            .unwrap();

        let stripe = StripeClient::new(StripeConfig {
            secret_key: "sk_test_offline".to_string(),
            price_ids: PriceIds {
                starter: "price_starter".to_string(),
                professional: "price_professional".to_string(),
                business: "price_business".to_string(),
                unlimited: "price_unlimited".to_string(),
                trial: None,
                pro: None,
                content_basic: None,
                content_pro: None,
                content_business: None,
            },
            app_base_url: "http://localhost:3000".to_string(),
        });

        let config = Config {
            bind_address: String::new(),
            database_url: String::new(),
            admin_user_ids: HashSet::from(["admin-1".to_string()]),
            admin_emails: HashSet::new(),
            github_api_base: "http://127.0.0.1:1".to_string(),
        };

        AppState::new(config, stripe, pool)
    }

    #[tokio::test]
    async fn test_fix_credits_accepts_empty_body() {
        let app = create_router(offline_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/admin/fix-credits")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // No body and no principal required; the only failure left is the
        // unreachable database
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_reconcile_endpoints_reject_unknown_principal() {
        for uri in ["/api/admin/fix-stripe-customers", "/api/admin/manual-fix-stripe"] {
            let app = create_router(offline_state());
            let response = app
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri(uri)
                        .header("content-type", "application/json")
                        .body(Body::from(r#"{"adminUserId":"nobody"}"#))
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_validate_tokens_over_limit_is_403() {
        let app = create_router(offline_state());

        let body = r#"{"plan":"professional","tokensUsed":90000,"tokensLimit":100000,"requestedTokens":20000}"#;
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/validate-tokens")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "INSUFFICIENT_TOKENS");
        assert_eq!(json["tokensUsed"], 90_000);
        assert_eq!(json["tokensLimit"], 100_000);
        assert_eq!(json["requested"], 20_000);
    }
}
