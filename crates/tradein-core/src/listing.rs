//! ============================================================================
//! Swap Listing - Read-only view of the user's swap requests
//! ============================================================================
//! Without a token the listing is `NotAuthenticated` and no request is made.
//! Status and values are shown exactly as the server reports them.
//! ============================================================================

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::{ApiError, SwapApi, TokenProvider};
use crate::types::{SwapId, SwapRequest, SwapStatus};

pub const LOGIN_REQUIRED_MESSAGE: &str = "Please log in to view your swaps.";
pub const LOAD_FAILED_MESSAGE: &str = "Could not load swaps";

/// One swap request, ready for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapView {
    pub id: SwapId,
    pub device_label: String,
    pub device_count: u32,
    pub status: SwapStatus,
    pub estimated_value: f64,
    pub final_value: Option<f64>,
    /// Final value once an admin set it, otherwise the estimate
    pub effective_value: f64,
    pub target_device_id: String,
    pub target_device_price: f64,
    pub difference: f64,
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SwapRequest> for SwapView {
    fn from(swap: SwapRequest) -> Self {
        let device = &swap.user_device;
        let device_label = format!("{} {}", device.brand, device.model).trim().to_string();

        Self {
            device_count: device.number_of_devices.unwrap_or(1),
            device_label,
            id: swap.id,
            status: swap.status,
            estimated_value: swap.estimated_value,
            final_value: swap.final_value,
            effective_value: swap.final_value.unwrap_or(swap.estimated_value),
            target_device_id: swap.target_device_id,
            target_device_price: swap.target_device_price,
            difference: swap.difference,
            admin_notes: swap.admin_notes,
            created_at: swap.created_at,
            updated_at: swap.updated_at,
        }
    }
}

/// What the listing screen shows
#[derive(Debug, Clone, PartialEq)]
pub enum ListingState {
    NotAuthenticated,
    Empty,
    Loaded(Vec<SwapView>),
    Failed(String),
}

impl ListingState {
    /// Message to show instead of a list, if any
    pub fn message(&self) -> Option<&str> {
        match self {
            ListingState::NotAuthenticated => Some(LOGIN_REQUIRED_MESSAGE),
            ListingState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

pub struct SwapListing {
    api: Arc<dyn SwapApi>,
    tokens: Arc<dyn TokenProvider>,
}

impl SwapListing {
    pub fn new(api: Arc<dyn SwapApi>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { api, tokens }
    }

    pub async fn load(&self) -> ListingState {
        let Some(token) = self.tokens.bearer_token() else {
            debug!("No access token, skipping swap listing");
            return ListingState::NotAuthenticated;
        };

        match self.api.list_my_swaps(&token).await {
            Ok(swaps) if swaps.is_empty() => ListingState::Empty,
            Ok(swaps) => ListingState::Loaded(swaps.into_iter().map(SwapView::from).collect()),
            Err(ApiError::Unauthorized { .. }) => ListingState::NotAuthenticated,
            Err(e) => {
                warn!("Failed to load swaps: {:?}", e);
                ListingState::Failed(
                    e.server_message()
                        .unwrap_or_else(|| LOAD_FAILED_MESSAGE.to_string()),
                )
            }
        }
    }
}
