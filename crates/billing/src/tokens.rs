//! Token and credit consumption gate
//!
//! Two entry points with different guarantees: the server-authoritative
//! [`TokenLedger::consume`] (atomic, safe for billing-grade enforcement) and
//! the stateless [`validate_usage`] check, which trusts whatever usage
//! figures the caller reports and persists nothing.

use serde::Serialize;
use sqlx::PgPool;
use stavitel_shared::{Plan, UserSubscription};

use crate::error::{BillingError, BillingResult};

/// Result of the stateless trust-the-caller validation
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageDecision {
    pub approved: bool,
    pub new_tokens_used: i64,
}

/// Decide whether a usage request fits within caller-reported figures
///
/// No integrity guarantee: the caller supplies its own current usage. Only
/// the server-authoritative consume path is safe for enforcement.
pub fn validate_usage(plan: Plan, tokens_used: i64, tokens_limit: i64, requested: i64) -> UsageDecision {
    let new_tokens_used = tokens_used.saturating_add(requested);
    let approved = !plan.enforces_token_limit() || new_tokens_used <= tokens_limit;
    UsageDecision {
        approved,
        new_tokens_used,
    }
}

/// Server-authoritative token ledger
#[derive(Clone)]
pub struct TokenLedger {
    pool: PgPool,
}

impl TokenLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Atomically consume tokens from a user's allowance
    ///
    /// The increment and the limit check happen in a single guarded UPDATE,
    /// so concurrent requests for the same user cannot race past the limit
    /// or drop increments. The only transition on the ledger is
    /// `tokens_used += amount`; there is no refund operation.
    pub async fn consume(&self, user_id: &str, tokens: i64) -> BillingResult<UserSubscription> {
        if tokens <= 0 {
            return Err(BillingError::InvalidInput(
                "tokens must be a positive amount".to_string(),
            ));
        }

        let updated: Option<UserSubscription> = sqlx::query_as(
            r#"
            UPDATE user_subscriptions
            SET tokens_used = tokens_used + $2, updated_at = NOW()
            WHERE user_id = $1
              AND (plan = 'unlimited' OR tokens_used + $2 <= tokens_limit)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(tokens)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(subscription) = updated {
            tracing::debug!(
                user_id = %user_id,
                tokens,
                tokens_used = subscription.tokens_used,
                tokens_limit = subscription.tokens_limit,
                "Consumed tokens"
            );
            return Ok(subscription);
        }

        // The guard rejected the update: either no ledger row exists, or the
        // allowance is insufficient. Tell the caller which.
        let current = self.get(user_id).await?;
        match current {
            None => Err(BillingError::NoSubscription(user_id.to_string())),
            Some(row) => Err(BillingError::InsufficientTokens {
                used: row.tokens_used,
                limit: row.tokens_limit,
                requested: tokens,
            }),
        }
    }

    /// Fetch a user's ledger row
    pub async fn get(&self, user_id: &str) -> BillingResult<Option<UserSubscription>> {
        let row: Option<UserSubscription> =
            sqlx::query_as("SELECT * FROM user_subscriptions WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row)
    }
}
