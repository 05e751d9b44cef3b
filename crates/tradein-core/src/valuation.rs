//! ============================================================================
//! Valuation - Deterministic trade-in value of a single device
//! ============================================================================
//! value = max(100 + storage*20 + ram*15 - condition*40 - issues*25 - battery, 50)
//!
//! Tier indexes come from the fixed vocabularies in `types`. A value missing
//! from its vocabulary has index -1 and therefore a negative boost. Stored
//! estimates depend on these exact numbers.
//! ============================================================================

use serde::Serialize;

use crate::types::{tier_index, DeviceRecord, CONDITIONS, RAM_TIERS, STORAGE_TIERS};

/// Starting value before modifiers
pub const BASE_VALUE: f64 = 100.0;

/// Added per storage tier above the smallest
pub const STORAGE_STEP: f64 = 20.0;

/// Added per RAM tier above the smallest
pub const RAM_STEP: f64 = 15.0;

/// Subtracted per condition tier past `CONDITION_FREE_TIERS`
pub const CONDITION_STEP: f64 = 40.0;

/// Condition index up to which no penalty applies ("Good" and better)
pub const CONDITION_FREE_TIERS: i64 = 2;

/// Subtracted per declared issue
pub const ISSUE_PENALTY: f64 = 25.0;

/// No device is ever valued below this
pub const MIN_VALUE: f64 = 50.0;

/// Individual terms of a valuation, for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationBreakdown {
    pub base: f64,
    pub storage_boost: f64,
    pub ram_boost: f64,
    pub condition_penalty: f64,
    pub issues_penalty: f64,
    pub battery_penalty: f64,
    /// Sum of the terms before the floor
    pub raw: f64,
    /// Final value, floored and rounded to cents
    pub value: f64,
}

/// Compute every term of the valuation for `device`
pub fn breakdown(device: &DeviceRecord) -> ValuationBreakdown {
    let storage_boost = tier_index(STORAGE_TIERS, &device.storage) as f64 * STORAGE_STEP;
    let ram_boost = tier_index(RAM_TIERS, &device.ram) as f64 * RAM_STEP;
    let condition_penalty =
        (tier_index(CONDITIONS, &device.condition) - CONDITION_FREE_TIERS).max(0) as f64
            * CONDITION_STEP;
    let issues_penalty = device.issues.len() as f64 * ISSUE_PENALTY;
    let battery_penalty = device
        .battery_health
        .map(|health| (100.0 - health).max(0.0))
        .unwrap_or(0.0);

    let raw = BASE_VALUE + storage_boost + ram_boost
        - condition_penalty
        - issues_penalty
        - battery_penalty;

    ValuationBreakdown {
        base: BASE_VALUE,
        storage_boost,
        ram_boost,
        condition_penalty,
        issues_penalty,
        battery_penalty,
        raw,
        value: round_cents(raw.max(MIN_VALUE)),
    }
}

/// Trade-in value of one device. Pure, never below MIN_VALUE.
pub fn valuation(device: &DeviceRecord) -> f64 {
    breakdown(device).value
}

pub(crate) fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
