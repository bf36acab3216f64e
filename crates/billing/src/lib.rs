//! Stavitel Billing
//!
//! Stripe integration for the Stavitel platform: the plan catalog, customer
//! directory management, subscription lookup, ledger reconciliation, and the
//! token/credit consumption gate.

pub mod checkout;
pub mod client;
pub mod customer;
pub mod error;
pub mod portal;
pub mod reconcile;
pub mod subscriptions;
pub mod tokens;

pub use checkout::{CheckoutResponse, CheckoutService, SessionDetails};
pub use client::{PriceIds, StripeClient, StripeConfig};
pub use customer::{
    build_directory_index, resolve_duplicates, CustomerService, DirectoryEntry, DirectoryIndex,
};
pub use error::{BillingError, BillingResult};
pub use portal::{PortalResponse, PortalService};
pub use reconcile::{
    credit_correction, CreditSweepSummary, DuplicateUser, FixedUser, ReconcileFix,
    ReconcileOutcome, ReconcileReport, ReconcileSummary, ReconciliationService,
};
pub use subscriptions::{CustomerSummary, SubscriptionService, SubscriptionSummary};
pub use tokens::{validate_usage, TokenLedger, UsageDecision};
