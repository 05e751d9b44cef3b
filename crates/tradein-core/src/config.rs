//! ============================================================================
//! Configuration - Swap service endpoints and local limits
//! ============================================================================
//! Every field can be overridden from the environment:
//! - TRADEIN_API_URL              swap service base URL
//! - TRADEIN_SUBMIT_TIMEOUT_SECS  create-swap timeout
//! - TRADEIN_CATALOG_LIMIT        number of target devices fetched
//! - TRADEIN_DRAFT_PATH           draft database file
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/";
pub const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CATALOG_LIMIT: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapConfig {
    pub api_base_url: String,
    pub submit_timeout_secs: u64,
    pub catalog_limit: usize,
    /// `None` uses ~/.tradein/drafts.redb
    pub draft_path: Option<String>,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

impl SwapConfig {
    /// Same as `default()`, named for call sites that read the environment
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Build from an arbitrary key lookup; blank values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            api_base_url: get("TRADEIN_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            submit_timeout_secs: parse_or(
                "TRADEIN_SUBMIT_TIMEOUT_SECS",
                get("TRADEIN_SUBMIT_TIMEOUT_SECS"),
                DEFAULT_SUBMIT_TIMEOUT_SECS,
            ),
            catalog_limit: parse_or(
                "TRADEIN_CATALOG_LIMIT",
                get("TRADEIN_CATALOG_LIMIT"),
                DEFAULT_CATALOG_LIMIT,
            ),
            draft_path: get("TRADEIN_DRAFT_PATH"),
        }
    }
}

fn parse_or<T: FromStr + Copy>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}='{}'", key, raw);
            default
        }),
    }
}
