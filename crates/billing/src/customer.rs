//! Stripe customer management and the customer directory scan

use std::collections::HashMap;

use sqlx::PgPool;
use stripe::{CreateCustomer, Customer, CustomerId, ListCustomers};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Metadata key stamped on every customer this system creates
pub const USER_ID_METADATA_KEY: &str = "user_id";

/// Page size for directory scans
const SCAN_PAGE_SIZE: u64 = 100;

/// Customer service for managing Stripe customers
#[derive(Clone)]
pub struct CustomerService {
    stripe: StripeClient,
    pool: PgPool,
}

impl CustomerService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Look up a user's Stripe customer ID in the local index
    pub async fn find_customer_id(&self, user_id: &str) -> BillingResult<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT customer_id FROM stripe_customers WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id,)| id))
    }

    /// Get the indexed customer ID for a user, or create a new Stripe
    /// customer tagged with the user ID and index it
    pub async fn get_or_create_customer(
        &self,
        user_id: &str,
        email: Option<&str>,
    ) -> BillingResult<String> {
        if let Some(existing) = self.find_customer_id(user_id).await? {
            return Ok(existing);
        }

        let mut metadata = HashMap::new();
        metadata.insert(USER_ID_METADATA_KEY.to_string(), user_id.to_string());

        let params = CreateCustomer {
            email,
            metadata: Some(metadata),
            ..Default::default()
        };

        let customer = Customer::create(self.stripe.inner(), params).await?;

        self.index_customer(user_id, customer.id.as_str()).await?;

        tracing::info!(
            user_id = %user_id,
            customer_id = %customer.id,
            "Created Stripe customer"
        );

        Ok(customer.id.to_string())
    }

    /// Upsert the user → customer index row
    pub async fn index_customer(&self, user_id: &str, customer_id: &str) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stripe_customers (user_id, customer_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET customer_id = EXCLUDED.customer_id
            "#,
        )
        .bind(user_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Enumerate the full customer directory in Stripe listing order
    ///
    /// Follows the pagination cursor until exhausted. A failed page fetch is
    /// terminal for the scan; the caller re-runs the whole scan. Only the
    /// administrative reconciliation job should call this.
    pub async fn list_all_customers(&self) -> BillingResult<Vec<Customer>> {
        let mut all = Vec::new();
        let mut starting_after: Option<CustomerId> = None;

        loop {
            let mut params = ListCustomers::new();
            params.limit = Some(SCAN_PAGE_SIZE);
            params.starting_after = starting_after.clone();

            let page = Customer::list(self.stripe.inner(), &params).await?;
            let has_more = page.has_more;
            starting_after = page.data.last().map(|c| c.id.clone());
            all.extend(page.data);

            if !has_more || starting_after.is_none() {
                break;
            }
        }

        tracing::debug!(count = all.len(), "Scanned Stripe customer directory");
        Ok(all)
    }
}

// =============================================================================
// Directory index
// =============================================================================

/// A customer as seen during a directory scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub customer_id: String,
    pub user_id: String,
    /// Creation time as a unix timestamp (Stripe listing is creation-ordered)
    pub created: i64,
}

impl DirectoryEntry {
    /// Extract a scan entry from a Stripe customer, skipping deleted
    /// customers and customers without a user tag
    pub fn from_customer(customer: &Customer) -> Option<Self> {
        if customer.deleted {
            return None;
        }
        let user_id = customer
            .metadata
            .as_ref()
            .and_then(|m| m.get(USER_ID_METADATA_KEY))
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())?;

        Some(Self {
            customer_id: customer.id.to_string(),
            user_id: user_id.to_string(),
            created: customer.created.unwrap_or(0),
        })
    }
}

/// The user → customer association built from a directory scan
#[derive(Debug, Default)]
pub struct DirectoryIndex {
    by_user: HashMap<String, DirectoryEntry>,
    /// Users that appeared on more than one customer, with every candidate
    /// in encounter order (the first element is the customer seen first)
    pub duplicates: HashMap<String, Vec<DirectoryEntry>>,
}

impl DirectoryIndex {
    /// The authoritative customer ID for a user, if one was found
    pub fn customer_for(&self, user_id: &str) -> Option<&str> {
        self.by_user.get(user_id).map(|e| e.customer_id.as_str())
    }

    /// Iterate every (user, customer) association
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_user
            .iter()
            .map(|(user, entry)| (user.as_str(), entry.customer_id.as_str()))
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }
}

/// Build the user → customer map from scan entries
///
/// Entries are processed in listing order. The first customer carrying a
/// user ID claims the map slot; later customers with the same user ID are
/// recorded as duplicates, and the slot is provisionally resolved keep-newest
/// by creation time. That provisional choice is superseded by
/// [`resolve_duplicates`] once subscription state is known.
pub fn build_directory_index(entries: Vec<DirectoryEntry>) -> DirectoryIndex {
    let mut index = DirectoryIndex::default();

    for entry in entries {
        match index.by_user.get(&entry.user_id) {
            None => {
                index.by_user.insert(entry.user_id.clone(), entry);
            }
            Some(existing) => {
                let candidates = index
                    .duplicates
                    .entry(entry.user_id.clone())
                    .or_insert_with(|| vec![existing.clone()]);
                candidates.push(entry.clone());

                if entry.created > existing.created {
                    index.by_user.insert(entry.user_id.clone(), entry);
                }
            }
        }
    }

    index
}

/// Resolve duplicate users against subscription state
///
/// For each user with duplicate customers, the first candidate (encounter
/// order) holding at least one active subscription becomes authoritative,
/// overriding the keep-newest heuristic. Users whose candidates all lack an
/// active subscription keep the keep-newest resolution.
pub fn resolve_duplicates(index: &mut DirectoryIndex, has_active: &HashMap<String, bool>) {
    let winners: Vec<(String, DirectoryEntry)> = index
        .duplicates
        .iter()
        .filter_map(|(user_id, candidates)| {
            candidates
                .iter()
                .find(|c| has_active.get(&c.customer_id).copied().unwrap_or(false))
                .map(|winner| (user_id.clone(), winner.clone()))
        })
        .collect();

    for (user_id, winner) in winners {
        index.by_user.insert(user_id, winner);
    }
}
