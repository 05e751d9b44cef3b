//! ============================================================================
//! Device Store - Ordered list of devices being traded in
//! ============================================================================
//! Keeps the device list in step with the chosen device count:
//! - Growing the count appends blank records
//! - Shrinking it truncates from the tail
//! - Edits merge into a record by id; unknown ids are ignored
//! ============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{DeviceRecord, ISSUES, MAX_DEVICES};

/// Partial update for a device record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DevicePatch {
    pub category: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub storage: Option<String>,
    pub ram: Option<String>,
    pub condition: Option<String>,
    /// Replaces the whole issue list
    pub issues: Option<Vec<String>>,
    /// `Some(None)` clears the battery health back to unknown
    pub battery_health: Option<Option<f64>>,
}

impl DevicePatch {
    fn apply_to(self, device: &mut DeviceRecord) {
        let fields = [
            (self.category, &mut device.category),
            (self.brand, &mut device.brand),
            (self.model, &mut device.model),
            (self.storage, &mut device.storage),
            (self.ram, &mut device.ram),
            (self.condition, &mut device.condition),
        ];
        for (value, slot) in fields {
            if let Some(value) = value {
                *slot = value;
            }
        }

        if let Some(issues) = self.issues {
            device.issues.clear();
            for issue in issues {
                if !device.issues.contains(&issue) {
                    device.issues.push(issue);
                }
            }
        }

        if let Some(battery_health) = self.battery_health {
            device.battery_health = battery_health;
        }
    }
}

/// Ordered device list. Its length is the device count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStore {
    devices: Vec<DeviceRecord>,
}

impl DeviceStore {
    /// Store holding a single blank device
    pub fn new() -> Self {
        Self {
            devices: vec![DeviceRecord::blank()],
        }
    }

    pub fn devices(&self) -> &[DeviceRecord] {
        &self.devices
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn get(&self, id: &str) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut DeviceRecord> {
        self.devices.iter_mut().find(|d| d.id == id)
    }

    /// Resize the list to `n` devices, clamped to [1, MAX_DEVICES].
    /// Returns the count actually applied.
    pub fn set_device_count(&mut self, n: usize) -> usize {
        let count = n.clamp(1, MAX_DEVICES);
        if count != n {
            debug!("Device count {} clamped to {}", n, count);
        }

        if count > self.devices.len() {
            let missing = count - self.devices.len();
            self.devices
                .extend(std::iter::repeat_with(DeviceRecord::blank).take(missing));
        } else {
            self.devices.truncate(count);
        }

        count
    }

    /// Merge `patch` into the device with `id`. Returns false if no such device.
    pub fn update_device(&mut self, id: &str, patch: DevicePatch) -> bool {
        let Some(device) = self.get_mut(id) else {
            debug!("Ignoring update for unknown device {}", id);
            return false;
        };

        patch.apply_to(device);

        for (field, value) in device.off_vocabulary() {
            warn!("Device {} has unlisted {} '{}'", id, field, value);
        }
        true
    }

    /// Remove the device with `id`, unless it is the last one
    pub fn remove_device(&mut self, id: &str) -> bool {
        if self.devices.len() <= 1 {
            debug!("Refusing to remove the only device");
            return false;
        }

        let before = self.devices.len();
        self.devices.retain(|d| d.id != id);
        before != self.devices.len()
    }

    /// Add `issue` if absent, remove it if present.
    /// Issues outside the known vocabulary are ignored.
    pub fn toggle_issue(&mut self, id: &str, issue: &str) -> bool {
        if !ISSUES.contains(&issue) {
            warn!("Ignoring unknown issue '{}'", issue);
            return false;
        }

        let Some(device) = self.get_mut(id) else {
            return false;
        };

        if let Some(pos) = device.issues.iter().position(|i| i == issue) {
            device.issues.remove(pos);
        } else {
            device.issues.push(issue.to_string());
        }
        true
    }
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}
