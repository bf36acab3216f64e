//! Common types used across Stavitel

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// Plans
// =============================================================================

/// Service plan for billing
///
/// Web plans gate AI website generation via a monthly token allowance;
/// content plans gate the content-generation add-on via a credit pool.
/// `Pro` is a legacy alias kept for subscriptions sold under the old name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Trial,
    Starter,
    Professional,
    Business,
    Unlimited,
    Pro,
    ContentBasic,
    ContentPro,
    ContentBusiness,
}

impl Default for Plan {
    fn default() -> Self {
        Self::Starter
    }
}

impl Plan {
    /// Monthly token allowance for this plan
    ///
    /// The value for `Unlimited` is never consulted: consumption checks
    /// bypass the limit entirely for that plan.
    pub fn monthly_tokens(&self) -> i64 {
        match self {
            Self::Trial => 10_000,
            Self::Starter => 50_000,
            Self::Professional => 100_000,
            Self::Business => 500_000,
            Self::Unlimited => 0,
            Self::Pro => 100_000, // Legacy plan - same as Professional
            Self::ContentBasic | Self::ContentPro | Self::ContentBusiness => 0,
        }
    }

    /// Content credit pool granted by this plan, if it is a content plan
    pub fn content_credits(&self) -> Option<i64> {
        match self {
            Self::ContentBasic => Some(10),
            Self::ContentPro => Some(50),
            Self::ContentBusiness => Some(200),
            _ => None,
        }
    }

    /// Whether the token limit is enforced for this plan
    pub fn enforces_token_limit(&self) -> bool {
        !matches!(self, Self::Unlimited)
    }

    /// Whether this is a content-only plan (credits, no web tokens)
    pub fn is_content_plan(&self) -> bool {
        matches!(
            self,
            Self::ContentBasic | Self::ContentPro | Self::ContentBusiness
        )
    }

    /// Whether this is a web-only plan (no credit pool of its own)
    pub fn is_web_only(&self) -> bool {
        !self.is_content_plan()
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Plan::Trial => "trial",
            Plan::Starter => "starter",
            Plan::Professional => "professional",
            Plan::Business => "business",
            Plan::Unlimited => "unlimited",
            Plan::Pro => "pro",
            Plan::ContentBasic => "content_basic",
            Plan::ContentPro => "content_pro",
            Plan::ContentBusiness => "content_business",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Plan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trial" => Ok(Plan::Trial),
            "starter" => Ok(Plan::Starter),
            "professional" => Ok(Plan::Professional),
            "business" => Ok(Plan::Business),
            "unlimited" => Ok(Plan::Unlimited),
            "pro" => Ok(Plan::Pro),
            "content_basic" => Ok(Plan::ContentBasic),
            "content_pro" => Ok(Plan::ContentPro),
            "content_business" => Ok(Plan::ContentBusiness),
            other => Err(format!("unknown plan: {}", other)),
        }
    }
}

// =============================================================================
// Subscription ledger
// =============================================================================

/// Content add-on attached to a base subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentAddon {
    pub plan: Plan,
    pub credits: i64,
    pub active: bool,
}

/// Per-user subscription ledger row
///
/// One row per user. Created when a checkout session completes; mutated by
/// ledger reconciliation and by the token consumption gate; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSubscription {
    pub user_id: String,
    pub plan: Plan,
    pub tokens_used: i64,
    pub tokens_limit: i64,
    pub credits: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_addon: Option<ContentAddon>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe_customer_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl UserSubscription {
    /// Active content add-on, if any
    pub fn active_addon(&self) -> Option<&ContentAddon> {
        self.content_addon.as_ref().filter(|a| a.active)
    }
}

// The add-on is stored as three nullable columns, so the row mapping is
// written out by hand instead of derived.
impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for UserSubscription {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let addon_plan: Option<Plan> = row.try_get("content_addon_plan")?;
        let addon_credits: Option<i64> = row.try_get("content_addon_credits")?;
        let addon_active: bool = row.try_get("content_addon_active")?;

        let content_addon = match (addon_plan, addon_credits) {
            (Some(plan), Some(credits)) => Some(ContentAddon {
                plan,
                credits,
                active: addon_active,
            }),
            _ => None,
        };

        Ok(Self {
            user_id: row.try_get("user_id")?,
            plan: row.try_get("plan")?,
            tokens_used: row.try_get("tokens_used")?,
            tokens_limit: row.try_get("tokens_limit")?,
            credits: row.try_get("credits")?,
            content_addon,
            stripe_customer_id: row.try_get("stripe_customer_id")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_token_allowances() {
        // Plan ladder: trial -> starter -> professional -> business -> unlimited
        assert_eq!(Plan::Trial.monthly_tokens(), 10_000);
        assert_eq!(Plan::Starter.monthly_tokens(), 50_000);
        assert_eq!(Plan::Professional.monthly_tokens(), 100_000);
        assert_eq!(Plan::Business.monthly_tokens(), 500_000);
        assert_eq!(Plan::Pro.monthly_tokens(), 100_000); // Legacy plan
        assert!(!Plan::Unlimited.enforces_token_limit());
    }

    #[test]
    fn test_content_plan_credits() {
        assert_eq!(Plan::ContentBasic.content_credits(), Some(10));
        assert_eq!(Plan::ContentPro.content_credits(), Some(50));
        assert_eq!(Plan::ContentBusiness.content_credits(), Some(200));
        assert_eq!(Plan::Professional.content_credits(), None);
    }

    #[test]
    fn test_plan_round_trip() {
        for plan in [
            Plan::Trial,
            Plan::Starter,
            Plan::Professional,
            Plan::Business,
            Plan::Unlimited,
            Plan::Pro,
            Plan::ContentBasic,
            Plan::ContentPro,
            Plan::ContentBusiness,
        ] {
            let parsed: Plan = plan.to_string().parse().unwrap();
            assert_eq!(parsed, plan);
        }
        assert!("platinum".parse::<Plan>().is_err());
    }

    #[test]
    fn test_web_only_classification() {
        assert!(Plan::Starter.is_web_only());
        assert!(Plan::Unlimited.is_web_only());
        assert!(!Plan::ContentBasic.is_web_only());
        assert!(Plan::ContentBusiness.is_content_plan());
    }
}
