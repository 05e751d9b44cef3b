//! ============================================================================
//! Wizard - Gated three-step trade-in flow
//! ============================================================================
//! Quantity -> Details -> Summary. Each transition function takes a session
//! snapshot and returns the next one:
//! - Next is applied only when the current step's admission predicate holds
//! - Back is always legal from Details and Summary
//! - Rejected transitions leave the snapshot unchanged and never error
//!
//! `Wizard` owns the live snapshot and publishes every change through a
//! `tokio::sync::watch` channel so a rendering layer can follow along.
//! ============================================================================

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::draft::DraftStore;
use crate::images::{encode_batch, AttachOutcome, ImageEncoder, RawImage};
use crate::pricing::{self, PricingSummary};
use crate::store::{DevicePatch, DeviceStore};
use crate::types::{Contact, DeviceRecord, TargetSelection, WizardStep, MAX_DEVICES};

/// A condition that keeps the session from being submitted
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReadinessIssue {
    #[error("Device {position} is missing: {missing}")]
    IncompleteDevice { position: usize, missing: String },

    #[error("Please enter a valid email address.")]
    InvalidEmail,

    #[error("Please enter your full name.")]
    MissingFullName,

    #[error("Please enter your phone number.")]
    MissingPhoneNumber,

    #[error("Please choose the device you want to receive.")]
    NoTargetDevice,

    #[error("Please review the summary before submitting.")]
    NotAtSummary,
}

/// `local@domain.tld` with no whitespace and exactly one `@`
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }

    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };

    !local.is_empty()
        && domain
            .char_indices()
            .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Immutable snapshot of one wizard session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardSession {
    step: WizardStep,
    store: DeviceStore,
    contact: Contact,
    target: Option<TargetSelection>,
}

impl WizardSession {
    pub fn new() -> Self {
        Self {
            step: WizardStep::Quantity,
            store: DeviceStore::new(),
            contact: Contact::default(),
            target: None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn device_count(&self) -> usize {
        self.store.device_count()
    }

    pub fn devices(&self) -> &[DeviceRecord] {
        self.store.devices()
    }

    pub fn device(&self, id: &str) -> Option<&DeviceRecord> {
        self.store.get(id)
    }

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    pub fn target(&self) -> Option<&TargetSelection> {
        self.target.as_ref()
    }

    pub fn total_estimated_value(&self) -> f64 {
        pricing::total_estimated_value(self.devices())
    }

    pub fn amount_owed(&self) -> f64 {
        let target_price = self.target.as_ref().map(|t| t.price).unwrap_or(0.0);
        pricing::amount_owed(target_price, self.total_estimated_value())
    }

    pub fn pricing(&self) -> PricingSummary {
        PricingSummary::compute(self.devices(), self.target.as_ref())
    }

    // ========================================================================
    // Admission Predicates
    // ========================================================================

    pub fn can_leave_quantity(&self) -> bool {
        (1..=MAX_DEVICES).contains(&self.device_count())
    }

    pub fn can_leave_details(&self) -> bool {
        self.devices().iter().all(DeviceRecord::is_complete)
    }

    /// Every unmet submit condition, devices first.
    /// Submitting is only possible from the Summary step.
    pub fn submit_blockers(&self) -> Vec<ReadinessIssue> {
        let mut issues: Vec<ReadinessIssue> = self
            .devices()
            .iter()
            .enumerate()
            .filter(|(_, d)| !d.is_complete())
            .map(|(i, d)| ReadinessIssue::IncompleteDevice {
                position: i + 1,
                missing: d.missing_fields().join(", "),
            })
            .collect();

        if !is_valid_email(&self.contact.email) {
            issues.push(ReadinessIssue::InvalidEmail);
        }
        if self.contact.full_name.trim().is_empty() {
            issues.push(ReadinessIssue::MissingFullName);
        }
        if self.contact.phone_number.trim().is_empty() {
            issues.push(ReadinessIssue::MissingPhoneNumber);
        }
        if self.target.as_ref().map_or(true, |t| t.id.trim().is_empty()) {
            issues.push(ReadinessIssue::NoTargetDevice);
        }
        if self.step != WizardStep::Summary {
            issues.push(ReadinessIssue::NotAtSummary);
        }
        issues
    }

    pub fn can_submit(&self) -> bool {
        self.submit_blockers().is_empty()
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Advance one step if the current step admits it
    pub fn go_next(mut self) -> Self {
        let admitted = match self.step {
            WizardStep::Quantity => self.can_leave_quantity(),
            WizardStep::Details => self.can_leave_details(),
            WizardStep::Summary => false,
        };

        match self.step.next() {
            Some(next) if admitted => {
                debug!("Wizard step {} -> {}", self.step, next);
                self.step = next;
            }
            _ => warn!("Wizard cannot leave step {} yet", self.step),
        }
        self
    }

    pub fn go_back(mut self) -> Self {
        if let Some(previous) = self.step.previous() {
            debug!("Wizard step {} -> {}", self.step, previous);
            self.step = previous;
        }
        self
    }

    pub fn with_device_count(mut self, n: usize) -> Self {
        self.store.set_device_count(n);
        self
    }

    pub fn with_device_update(mut self, id: &str, patch: DevicePatch) -> Self {
        self.store.update_device(id, patch);
        self
    }

    pub fn without_device(mut self, id: &str) -> Self {
        self.store.remove_device(id);
        self
    }

    pub fn with_issue_toggled(mut self, id: &str, issue: &str) -> Self {
        self.store.toggle_issue(id, issue);
        self
    }

    /// Append already-encoded images, keeping at most the device's capacity
    pub fn with_images(mut self, id: &str, encoded: Vec<String>) -> Self {
        if let Some(device) = self.store.get_mut(id) {
            device.push_images(encoded);
        }
        self
    }

    pub fn without_image(mut self, id: &str, index: usize) -> Self {
        if let Some(device) = self.store.get_mut(id) {
            device.remove_image(index);
        }
        self
    }

    pub fn with_contact(mut self, contact: Contact) -> Self {
        self.contact = contact;
        self
    }

    pub fn with_target(mut self, target: TargetSelection) -> Self {
        self.target = Some(target);
        self
    }
}

impl Default for WizardSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Live wizard: owns the current snapshot and notifies subscribers
pub struct Wizard {
    state: watch::Sender<WizardSession>,
    encoder: Arc<dyn ImageEncoder>,
}

impl Wizard {
    pub fn new(encoder: Arc<dyn ImageEncoder>) -> Self {
        Self::from_session(WizardSession::new(), encoder)
    }

    pub fn from_session(session: WizardSession, encoder: Arc<dyn ImageEncoder>) -> Self {
        let (state, _) = watch::channel(session);
        Self { state, encoder }
    }

    /// Start from the saved draft if there is one
    pub fn resume(drafts: &dyn DraftStore, encoder: Arc<dyn ImageEncoder>) -> Result<Self> {
        let session = match drafts.load()? {
            Some(session) => {
                info!(
                    "Resuming draft at step {} with {} device(s)",
                    session.step(),
                    session.device_count()
                );
                session
            }
            None => WizardSession::new(),
        };
        Ok(Self::from_session(session, encoder))
    }

    /// Copy of the current snapshot
    pub fn snapshot(&self) -> WizardSession {
        self.state.borrow().clone()
    }

    /// Receiver that observes every new snapshot
    pub fn subscribe(&self) -> watch::Receiver<WizardSession> {
        self.state.subscribe()
    }

    /// Replace the snapshot with `f(snapshot)`; subscribers are only
    /// notified when something changed. Returns the new snapshot.
    pub fn apply(&self, f: impl FnOnce(WizardSession) -> WizardSession) -> WizardSession {
        self.state.send_if_modified(|current| {
            let next = f(current.clone());
            if next == *current {
                false
            } else {
                *current = next;
                true
            }
        });
        self.snapshot()
    }

    pub fn set_device_count(&self, n: usize) -> WizardSession {
        self.apply(|s| s.with_device_count(n))
    }

    pub fn update_device(&self, id: &str, patch: DevicePatch) -> WizardSession {
        self.apply(|s| s.with_device_update(id, patch))
    }

    pub fn remove_device(&self, id: &str) -> WizardSession {
        self.apply(|s| s.without_device(id))
    }

    pub fn toggle_issue(&self, id: &str, issue: &str) -> WizardSession {
        self.apply(|s| s.with_issue_toggled(id, issue))
    }

    pub fn set_contact(&self, contact: Contact) -> WizardSession {
        self.apply(|s| s.with_contact(contact))
    }

    pub fn select_target(&self, target: TargetSelection) -> WizardSession {
        self.apply(|s| s.with_target(target))
    }

    /// Returns true if the step changed
    pub fn go_next(&self) -> bool {
        let before = self.snapshot().step();
        self.apply(WizardSession::go_next).step() != before
    }

    /// Returns true if the step changed
    pub fn go_back(&self) -> bool {
        let before = self.snapshot().step();
        self.apply(WizardSession::go_back).step() != before
    }

    /// Encode `files` and attach them to the device with `id`
    pub async fn attach_images(&self, id: &str, files: Vec<RawImage>) -> AttachOutcome {
        let remaining = match self.snapshot().device(id) {
            Some(device) => device.image_slots_left(),
            None => return AttachOutcome::DeviceNotFound,
        };
        if remaining == 0 {
            warn!("Device {} already has the maximum number of photos", id);
            return AttachOutcome::CapacityReached;
        }

        let batch = encode_batch(self.encoder.as_ref(), remaining, &files).await;

        // capacity is re-checked here in case another batch landed meanwhile
        let before = self.snapshot().device(id).map_or(0, |d| d.images.len());
        let after = self
            .apply(|s| s.with_images(id, batch.images))
            .device(id)
            .map_or(0, |d| d.images.len());

        AttachOutcome::Attached {
            added: after.saturating_sub(before),
            dropped: batch.dropped,
            skipped: batch.skipped,
        }
    }

    pub fn remove_image(&self, id: &str, index: usize) -> WizardSession {
        self.apply(|s| s.without_image(id, index))
    }

    /// Save the current snapshot as the pending draft
    pub fn checkpoint(&self, drafts: &dyn DraftStore) -> Result<()> {
        drafts.save(&self.snapshot())
    }

    /// Discard the session and its draft without creating a request
    pub fn cancel(self, drafts: Option<&dyn DraftStore>) -> Result<()> {
        info!("Wizard cancelled");
        if let Some(drafts) = drafts {
            drafts.clear()?;
        }
        Ok(())
    }
}
