//! Ledger reconciliation
//!
//! Corrects drift between Stripe (the source of truth for customers and
//! subscriptions) and the persisted per-user subscription ledger. Run from
//! the admin endpoints; safe to re-run wholesale, since a second pass over
//! unchanged state reports zero fixes.

use std::collections::HashMap;

use serde::Serialize;
use sqlx::PgPool;
use stavitel_shared::{ContentAddon, Plan, UserSubscription};

use crate::client::StripeClient;
use crate::customer::{build_directory_index, resolve_duplicates, CustomerService, DirectoryEntry};
use crate::error::BillingResult;
use crate::subscriptions::SubscriptionService;

/// A single field-level fix applied to a user's ledger row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileFix {
    CustomerId(String),
    Credits(i64),
}

impl std::fmt::Display for ReconcileFix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileFix::CustomerId(id) => write!(f, "customer_id -> {}", id),
            ReconcileFix::Credits(credits) => write!(f, "credits -> {}", credits),
        }
    }
}

/// Outcome of reconciling one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Unchanged,
    Fixed(Vec<ReconcileFix>),
    Skipped(&'static str),
}

/// A user whose ledger row was patched
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedUser {
    pub user_id: String,
    pub fixes: Vec<String>,
}

/// A user that appeared on more than one Stripe customer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateUser {
    pub user_id: String,
    pub candidates: Vec<String>,
    pub resolved: String,
}

/// Counters for a full reconciliation pass
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    pub customers_scanned: usize,
    pub users_checked: usize,
    pub users_fixed: usize,
    pub users_skipped: usize,
    pub errors: usize,
}

/// Full report of a reconciliation pass
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub summary: ReconcileSummary,
    pub fixed_users: Vec<FixedUser>,
    pub duplicate_users: Vec<DuplicateUser>,
}

/// Counters for a credit-rule sweep over the ledger
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditSweepSummary {
    pub checked: usize,
    pub fixed: usize,
    pub errors: usize,
}

/// Compute the credit value a ledger row should hold, if it is wrong
///
/// Rules, in order:
/// - an active content add-on forces `credits` to the add-on's pool;
/// - a web-only plan without an active add-on must hold zero credits;
/// - content-only plans without an add-on record are left alone.
pub fn credit_correction(plan: Plan, addon: Option<&ContentAddon>, credits: i64) -> Option<i64> {
    match addon {
        Some(addon) if addon.active => (credits != addon.credits).then_some(addon.credits),
        _ => (plan.is_web_only() && credits > 0).then_some(0),
    }
}

/// Reconciliation service
#[derive(Clone)]
pub struct ReconciliationService {
    customers: CustomerService,
    subscriptions: SubscriptionService,
    pool: PgPool,
}

impl ReconciliationService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self {
            customers: CustomerService::new(stripe.clone(), pool.clone()),
            subscriptions: SubscriptionService::new(stripe, pool.clone()),
            pool,
        }
    }

    /// Scan the full customer directory and reconcile every associated user
    ///
    /// `apply_credit_rules` controls whether the credit-consistency rules run
    /// alongside the customer-id fixes; the manual admin pass patches only
    /// customer ids.
    pub async fn reconcile_all(&self, apply_credit_rules: bool) -> BillingResult<ReconcileReport> {
        let customers = self.customers.list_all_customers().await?;
        let customers_scanned = customers.len();

        let entries: Vec<DirectoryEntry> = customers
            .iter()
            .filter_map(DirectoryEntry::from_customer)
            .collect();

        let mut index = build_directory_index(entries);

        // Duplicate resolution needs to know which candidates still hold an
        // active subscription. Failures here abort the scan, same as a failed
        // page fetch; the run is idempotent and can simply be repeated.
        let mut has_active: HashMap<String, bool> = HashMap::new();
        for candidates in index.duplicates.values() {
            for candidate in candidates {
                if !has_active.contains_key(&candidate.customer_id) {
                    let active = self
                        .subscriptions
                        .has_active_subscription(&candidate.customer_id)
                        .await?;
                    has_active.insert(candidate.customer_id.clone(), active);
                }
            }
        }
        resolve_duplicates(&mut index, &has_active);

        let duplicate_users: Vec<DuplicateUser> = index
            .duplicates
            .iter()
            .map(|(user_id, candidates)| DuplicateUser {
                user_id: user_id.clone(),
                candidates: candidates.iter().map(|c| c.customer_id.clone()).collect(),
                resolved: index
                    .customer_for(user_id)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect();

        let associations: Vec<(String, String)> = index
            .iter()
            .map(|(user, customer)| (user.to_string(), customer.to_string()))
            .collect();

        let mut summary = ReconcileSummary {
            customers_scanned,
            ..Default::default()
        };
        let mut fixed_users = Vec::new();

        for (user_id, customer_id) in associations {
            summary.users_checked += 1;
            match self
                .reconcile_user(&user_id, Some(&customer_id), apply_credit_rules)
                .await
            {
                Ok(ReconcileOutcome::Fixed(fixes)) => {
                    summary.users_fixed += 1;
                    fixed_users.push(FixedUser {
                        user_id,
                        fixes: fixes.iter().map(|f| f.to_string()).collect(),
                    });
                }
                Ok(ReconcileOutcome::Skipped(reason)) => {
                    summary.users_skipped += 1;
                    tracing::debug!(user_id = %user_id, reason, "Skipped user");
                }
                Ok(ReconcileOutcome::Unchanged) => {}
                // One user's failure must not abort the batch
                Err(e) => {
                    summary.errors += 1;
                    tracing::error!(user_id = %user_id, error = %e, "Reconciliation failed for user");
                }
            }
        }

        tracing::info!(
            customers_scanned = summary.customers_scanned,
            users_checked = summary.users_checked,
            users_fixed = summary.users_fixed,
            errors = summary.errors,
            "Reconciliation pass complete"
        );

        Ok(ReconcileReport {
            summary,
            fixed_users,
            duplicate_users,
        })
    }

    /// Reconcile a single user's ledger row against the authoritative
    /// customer association
    ///
    /// The customer-id overwrite is unconditional (Stripe is the source of
    /// truth); each fix is a separate field-level update, not one
    /// transaction.
    pub async fn reconcile_user(
        &self,
        user_id: &str,
        authoritative_customer: Option<&str>,
        apply_credit_rules: bool,
    ) -> BillingResult<ReconcileOutcome> {
        let row: Option<UserSubscription> = sqlx::query_as(
            "SELECT * FROM user_subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(subscription) = row else {
            return Ok(ReconcileOutcome::Skipped("no subscription document"));
        };

        let mut fixes = Vec::new();

        if let Some(customer_id) = authoritative_customer {
            if subscription.stripe_customer_id.as_deref() != Some(customer_id) {
                sqlx::query(
                    r#"
                    UPDATE user_subscriptions
                    SET stripe_customer_id = $2, updated_at = NOW()
                    WHERE user_id = $1
                    "#,
                )
                .bind(user_id)
                .bind(customer_id)
                .execute(&self.pool)
                .await?;

                // Keep the lookup index in step with the ledger
                self.customers.index_customer(user_id, customer_id).await?;

                tracing::info!(
                    user_id = %user_id,
                    old = ?subscription.stripe_customer_id,
                    new = %customer_id,
                    "Fixed stripe customer id"
                );
                fixes.push(ReconcileFix::CustomerId(customer_id.to_string()));
            }
        }

        if apply_credit_rules {
            if let Some(fix) = self.apply_credit_rule(&subscription).await? {
                fixes.push(fix);
            }
        }

        if fixes.is_empty() {
            Ok(ReconcileOutcome::Unchanged)
        } else {
            Ok(ReconcileOutcome::Fixed(fixes))
        }
    }

    /// Sweep the whole ledger applying only the credit-consistency rules
    ///
    /// Per-row failures are counted and the sweep continues.
    pub async fn fix_credits_all(&self) -> BillingResult<CreditSweepSummary> {
        let rows: Vec<UserSubscription> =
            sqlx::query_as("SELECT * FROM user_subscriptions ORDER BY user_id")
                .fetch_all(&self.pool)
                .await?;

        let mut summary = CreditSweepSummary::default();

        for row in rows {
            summary.checked += 1;
            match self.apply_credit_rule(&row).await {
                Ok(Some(_)) => summary.fixed += 1,
                Ok(None) => {}
                Err(e) => {
                    summary.errors += 1;
                    tracing::error!(user_id = %row.user_id, error = %e, "Credit fix failed for user");
                }
            }
        }

        tracing::info!(
            checked = summary.checked,
            fixed = summary.fixed,
            errors = summary.errors,
            "Credit sweep complete"
        );

        Ok(summary)
    }

    async fn apply_credit_rule(
        &self,
        subscription: &UserSubscription,
    ) -> BillingResult<Option<ReconcileFix>> {
        let Some(new_credits) = credit_correction(
            subscription.plan,
            subscription.content_addon.as_ref(),
            subscription.credits,
        ) else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE user_subscriptions
            SET credits = $2, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(&subscription.user_id)
        .bind(new_credits)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            user_id = %subscription.user_id,
            plan = %subscription.plan,
            old_credits = subscription.credits,
            new_credits,
            "Fixed credits"
        );

        Ok(Some(ReconcileFix::Credits(new_credits)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addon(credits: i64, active: bool) -> ContentAddon {
        ContentAddon {
            plan: Plan::ContentBasic,
            credits,
            active,
        }
    }

    #[test]
    fn test_web_only_plan_credits_reset() {
        // starter with stray credits and no add-on
        assert_eq!(credit_correction(Plan::Starter, None, 50), Some(0));
        assert_eq!(credit_correction(Plan::Starter, None, 0), None);
        assert_eq!(credit_correction(Plan::Unlimited, None, 1), Some(0));
    }

    #[test]
    fn test_addon_credits_forced() {
        assert_eq!(
            credit_correction(Plan::Professional, Some(&addon(20, true)), 5),
            Some(20)
        );
        assert_eq!(
            credit_correction(Plan::Professional, Some(&addon(20, true)), 20),
            None
        );
    }

    #[test]
    fn test_inactive_addon_treated_as_web_only() {
        assert_eq!(
            credit_correction(Plan::Business, Some(&addon(20, false)), 7),
            Some(0)
        );
    }

    #[test]
    fn test_content_only_plan_left_alone() {
        // content-only rows hold their credits directly; no add-on record
        assert_eq!(credit_correction(Plan::ContentBasic, None, 10), None);
        assert_eq!(credit_correction(Plan::ContentBusiness, None, 0), None);
    }

    #[test]
    fn test_fix_display() {
        assert_eq!(
            ReconcileFix::CustomerId("cus_1".to_string()).to_string(),
            "customer_id -> cus_1"
        );
        assert_eq!(ReconcileFix::Credits(20).to_string(), "credits -> 20");
    }
}
