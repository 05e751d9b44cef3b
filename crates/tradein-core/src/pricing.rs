//! ============================================================================
//! Pricing - Aggregate trade-in value against the target device
//! ============================================================================
//! Totals are recomputed from the device list on every call, never cached.
//! The amount owed is floored at zero: surplus trade-in value is neither
//! refunded nor carried over.
//! ============================================================================

use serde::Serialize;

use crate::types::{DeviceRecord, TargetSelection};
use crate::valuation::{round_cents, valuation};

/// Sum of the valuations of every device
pub fn total_estimated_value(devices: &[DeviceRecord]) -> f64 {
    round_cents(devices.iter().map(valuation).sum())
}

/// Cash the user pays on top of the trade-in, never negative
pub fn amount_owed(target_price: f64, total_estimated_value: f64) -> f64 {
    round_cents((target_price - total_estimated_value).max(0.0))
}

/// Value of one device within a summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceValuation {
    pub device_id: String,
    pub label: String,
    pub value: f64,
}

/// Everything the summary step displays
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingSummary {
    pub devices: Vec<DeviceValuation>,
    pub total_estimated_value: f64,
    /// `None` until a target device is chosen
    pub target_price: Option<f64>,
    pub amount_owed: f64,
}

impl PricingSummary {
    pub fn compute(devices: &[DeviceRecord], target: Option<&TargetSelection>) -> Self {
        let per_device: Vec<DeviceValuation> = devices
            .iter()
            .map(|d| DeviceValuation {
                device_id: d.id.clone(),
                label: d.label(),
                value: valuation(d),
            })
            .collect();

        let total = total_estimated_value(devices);
        let target_price = target.map(|t| t.price);

        Self {
            devices: per_device,
            total_estimated_value: total,
            target_price,
            amount_owed: amount_owed(target_price.unwrap_or(0.0), total),
        }
    }
}
