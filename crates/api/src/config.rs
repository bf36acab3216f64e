//! Application configuration

use std::collections::HashSet;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub database_url: String,

    // Admin principals allowed to run the reconciliation endpoints.
    // Comma-separated in ADMIN_USER_IDS / ADMIN_EMAILS, resolved at startup.
    pub admin_user_ids: HashSet<String>,
    pub admin_emails: HashSet<String>,

    // GitHub content proxy
    pub github_api_base: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            // User IDs are case-sensitive opaque strings; emails are not
            admin_user_ids: parse_principal_list(env::var("ADMIN_USER_IDS").ok(), false),
            admin_emails: parse_principal_list(env::var("ADMIN_EMAILS").ok(), true),

            github_api_base: env::var("GITHUB_API_BASE")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
        })
    }

    /// Whether the given identity is an authorized admin principal
    pub fn is_admin(&self, user_id: Option<&str>, email: Option<&str>) -> bool {
        if let Some(id) = user_id {
            if self.admin_user_ids.contains(id) {
                return true;
            }
        }
        if let Some(email) = email {
            if self.admin_emails.contains(&email.to_lowercase()) {
                return true;
            }
        }
        false
    }
}

fn parse_principal_list(raw: Option<String>, lowercase: bool) -> HashSet<String> {
    raw.map(|s| {
        s.split(',')
            .map(|item| {
                let item = item.trim();
                if lowercase {
                    item.to_lowercase()
                } else {
                    item.to_string()
                }
            })
            .filter(|item| !item.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
