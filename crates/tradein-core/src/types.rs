//! ============================================================================
//! Core Types for the Trade-In Swap Engine
//! ============================================================================
//! Defines device records, the fixed vocabularies used by the wizard and the
//! valuation, and the server-owned swap request shape.
//! Device records are serialized to JSON for the swap service and to bincode
//! for local drafts, so session types avoid serde attributes bincode rejects.
//! ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum number of devices traded in one swap
pub const MAX_DEVICES: usize = 5;

/// Maximum number of photos attached to a single device
pub const MAX_IMAGES_PER_DEVICE: usize = 5;

/// Device categories accepted by the swap service
pub const CATEGORIES: &[&str] = &["Smartphones", "Laptops", "Tablets", "Cameras", "Accessories"];

/// Storage tiers, smallest first. Order is a valuation signal.
pub const STORAGE_TIERS: &[&str] = &["64GB", "128GB", "256GB", "512GB", "1TB"];

/// RAM tiers, smallest first. Order is a valuation signal.
pub const RAM_TIERS: &[&str] = &["4GB", "6GB", "8GB", "12GB", "16GB"];

/// Conditions, best first. Order is a valuation signal.
pub const CONDITIONS: &[&str] = &["Like New", "Excellent", "Good", "Fair", "Needs Repair"];

/// Known issues a device can be declared with
pub const ISSUES: &[&str] = &["Screen crack", "Camera", "Speaker", "Charging port"];

/// Position of `value` in an ordered vocabulary, or -1 when it is not listed.
pub fn tier_index(vocabulary: &[&str], value: &str) -> i64 {
    vocabulary
        .iter()
        .position(|v| *v == value)
        .map(|i| i as i64)
        .unwrap_or(-1)
}

/// Parse a battery health percentage as typed by the user.
/// Blank input means "unknown" and yields `None`.
pub fn parse_battery_health(raw: &str) -> Result<Option<f64>, SwapError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && (0.0..=100.0).contains(&value) => Ok(Some(value)),
        _ => Err(SwapError::InvalidBatteryHealth(raw.to_string())),
    }
}

// ============================================================================
// Device Records
// ============================================================================

/// One device being traded in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Session-local identifier, not a persisted identity
    pub id: String,
    pub category: String,
    pub brand: String,
    pub model: String,
    pub storage: String,
    pub ram: String,
    pub condition: String,
    /// Declared issues, insertion ordered, no duplicates
    pub issues: Vec<String>,
    /// Battery health percentage; `None` means unknown
    pub battery_health: Option<f64>,
    /// Encoded photos (data URLs), at most MAX_IMAGES_PER_DEVICE
    pub images: Vec<String>,
}

impl DeviceRecord {
    /// Fresh record with every field empty
    pub fn blank() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            category: String::new(),
            brand: String::new(),
            model: String::new(),
            storage: String::new(),
            ram: String::new(),
            condition: String::new(),
            issues: Vec::new(),
            battery_health: None,
            images: Vec::new(),
        }
    }

    /// Names of the required fields that are still empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("category", &self.category),
            ("brand", &self.brand),
            ("model", &self.model),
            ("storage", &self.storage),
            ("ram", &self.ram),
            ("condition", &self.condition),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    /// Every required field is filled in
    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Enumerated fields holding a value outside their vocabulary.
    /// Empty fields are not reported.
    pub fn off_vocabulary(&self) -> Vec<(&'static str, String)> {
        [
            ("category", CATEGORIES, &self.category),
            ("storage", STORAGE_TIERS, &self.storage),
            ("ram", RAM_TIERS, &self.ram),
            ("condition", CONDITIONS, &self.condition),
        ]
        .into_iter()
        .filter(|(_, vocabulary, value)| !value.is_empty() && tier_index(vocabulary, value) < 0)
        .map(|(name, _, value)| (name, value.clone()))
        .collect()
    }

    /// "Brand Model" for display
    pub fn label(&self) -> String {
        format!("{} {}", self.brand, self.model).trim().to_string()
    }
}

// ============================================================================
// Wizard Types
// ============================================================================

/// Wizard steps, strictly ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WizardStep {
    Quantity,
    Details,
    Summary,
}

impl WizardStep {
    pub fn next(self) -> Option<Self> {
        match self {
            WizardStep::Quantity => Some(WizardStep::Details),
            WizardStep::Details => Some(WizardStep::Summary),
            WizardStep::Summary => None,
        }
    }

    pub fn previous(self) -> Option<Self> {
        match self {
            WizardStep::Quantity => None,
            WizardStep::Details => Some(WizardStep::Quantity),
            WizardStep::Summary => Some(WizardStep::Details),
        }
    }

    /// 1-based position for display
    pub fn number(self) -> u8 {
        match self {
            WizardStep::Quantity => 1,
            WizardStep::Details => 2,
            WizardStep::Summary => 3,
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WizardStep::Quantity => "Quantity",
            WizardStep::Details => "Details",
            WizardStep::Summary => "Summary",
        };
        write!(f, "{}", name)
    }
}

/// Contact details collected at the summary step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub email: String,
    pub full_name: String,
    pub phone_number: String,
}

/// The catalog item chosen as the target device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSelection {
    pub id: String,
    pub price: f64,
}

// ============================================================================
// Server-Owned Swap Requests
// ============================================================================

/// Server-assigned swap identifier (numeric or string)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SwapId {
    Number(u64),
    Text(String),
}

impl fmt::Display for SwapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapId::Number(n) => write!(f, "{}", n),
            SwapId::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Swap request status. Only the admin side ever changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
    Cancelled,
}

impl SwapStatus {
    /// Whether an admin has ruled on the request
    pub fn is_decided(self) -> bool {
        !matches!(self, SwapStatus::Pending)
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SwapStatus::Pending => "pending",
            SwapStatus::Approved => "approved",
            SwapStatus::Rejected => "rejected",
            SwapStatus::Completed => "completed",
            SwapStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}

/// Primary device as echoed back by the swap service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubmittedDevice {
    pub category: String,
    pub brand: String,
    pub model: String,
    pub storage: String,
    pub ram: String,
    pub condition: String,
    pub number_of_devices: Option<u32>,
}

/// A swap request as stored by the swap service
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SwapRequest {
    pub id: SwapId,
    #[serde(default)]
    pub user_device: SubmittedDevice,
    #[serde(deserialize_with = "de_money")]
    pub estimated_value: f64,
    /// Admin-set value, authoritative once present
    #[serde(default, deserialize_with = "de_opt_money")]
    pub final_value: Option<f64>,
    #[serde(deserialize_with = "de_string_id")]
    pub target_device_id: String,
    #[serde(deserialize_with = "de_money")]
    pub target_device_price: f64,
    #[serde(default, deserialize_with = "de_money")]
    pub difference: f64,
    pub status: SwapStatus,
    #[serde(default)]
    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Lenient Wire Decoding
// ============================================================================
// The swap service serializes decimals as strings ("160.00") and ids as
// either numbers or strings.

#[derive(Deserialize)]
#[serde(untagged)]
enum MoneyRepr {
    Number(f64),
    Text(String),
}

impl MoneyRepr {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            MoneyRepr::Number(n) => Ok(n),
            MoneyRepr::Text(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| E::custom(format!("invalid decimal amount '{}'", s))),
        }
    }
}

pub(crate) fn de_money<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    MoneyRepr::deserialize(deserializer)?.into_f64()
}

pub(crate) fn de_opt_money<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<f64>, D::Error> {
    Option::<MoneyRepr>::deserialize(deserializer)?
        .map(MoneyRepr::into_f64)
        .transpose()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(u64),
    Text(String),
}

pub(crate) fn de_string_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Number(n) => n.to_string(),
        IdRepr::Text(s) => s,
    })
}

/// Error types for the swap engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SwapError {
    #[error("Battery health must be a number between 0 and 100, got '{0}'")]
    InvalidBatteryHealth(String),

    #[error("Target device not found in catalog: {0}")]
    TargetNotFound(String),
}
