//! Admin reconciliation routes
//!
//! The Stripe-touching passes are gated on the configured admin allow-list:
//! the caller identifies itself in the request body, and an unknown
//! principal gets a 401 before any work happens. The credit sweep is
//! ungated; it never calls Stripe and only enforces the credit rules.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use stavitel_billing::{DuplicateUser, FixedUser, ReconcileSummary};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRequest {
    pub admin_user_id: Option<String>,
    pub admin_email: Option<String>,
}

fn require_admin(state: &AppState, req: &AdminRequest) -> ApiResult<()> {
    let authorized = state
        .config
        .is_admin(req.admin_user_id.as_deref(), req.admin_email.as_deref());
    if !authorized {
        tracing::warn!(
            admin_user_id = ?req.admin_user_id,
            admin_email = ?req.admin_email,
            "Rejected admin endpoint call"
        );
        return Err(ApiError::Unauthorized);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixCreditsResponse {
    pub success: bool,
    pub checked: usize,
    pub fixed: usize,
    pub errors: usize,
    pub message: String,
}

/// Sweep the whole ledger and correct credit balances
///
/// Takes no body and no principal: the sweep only applies the
/// deterministic credit rules and is safe to re-run.
pub async fn fix_credits(State(state): State<AppState>) -> ApiResult<Json<FixCreditsResponse>> {
    let summary = state.reconciliation.fix_credits_all().await?;

    Ok(Json(FixCreditsResponse {
        success: true,
        checked: summary.checked,
        fixed: summary.fixed,
        errors: summary.errors,
        message: format!(
            "Checked {} users, fixed {} ({} errors)",
            summary.checked, summary.fixed, summary.errors
        ),
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    pub success: bool,
    pub summary: ReconcileSummary,
    pub fixed_users: Vec<FixedUser>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplicate_users: Vec<DuplicateUser>,
}

/// Full reconciliation: customer associations plus credit rules
pub async fn fix_stripe_customers(
    State(state): State<AppState>,
    Json(req): Json<AdminRequest>,
) -> ApiResult<Json<ReconcileResponse>> {
    require_admin(&state, &req)?;

    let report = state.reconciliation.reconcile_all(true).await?;

    Ok(Json(ReconcileResponse {
        success: true,
        summary: report.summary,
        fixed_users: report.fixed_users,
        duplicate_users: report.duplicate_users,
    }))
}

/// Customer-association pass only, without touching credit balances
///
/// Used when an operator wants to repair stale customer ids after a support
/// intervention without re-running the credit rules.
pub async fn manual_fix_stripe(
    State(state): State<AppState>,
    Json(req): Json<AdminRequest>,
) -> ApiResult<Json<ReconcileResponse>> {
    require_admin(&state, &req)?;

    let report = state.reconciliation.reconcile_all(false).await?;

    // Narrower response than the full pass: no duplicate listing
    Ok(Json(ReconcileResponse {
        success: true,
        summary: report.summary,
        fixed_users: report.fixed_users,
        duplicate_users: Vec::new(),
    }))
}
