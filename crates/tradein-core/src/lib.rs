//! ============================================================================
//! TRADEIN-CORE: Device Trade-In Swap Engine
//! ============================================================================
//! Collects the devices a user trades in, values them, and turns the session
//! into a swap request against the swap service:
//! - Device store and gated three-step wizard
//! - Deterministic valuation and amount-owed pricing
//! - Photo attachment with data URL encoding
//! - Single-flight submission and the swap listing view
//! - Draft persistence via redb
//! ============================================================================

pub mod api;
pub mod catalog;
pub mod config;
pub mod draft;
pub mod images;
pub mod listing;
pub mod pricing;
pub mod store;
pub mod submission;
pub mod types;
pub mod valuation;
pub mod wizard;

// Re-export main types for convenience
pub use types::*;
pub use api::{ApiError, CatalogApi, EnvTokenProvider, HttpSwapClient, StaticToken, SwapApi, TokenProvider};
pub use catalog::{Catalog, TargetDevice};
pub use config::SwapConfig;
pub use draft::{DraftStore, MemoryDraftStore, RedbDraftStore};
pub use images::{AttachOutcome, DataUrlEncoder, ImageEncoder, RawImage};
pub use listing::{ListingState, SwapListing, SwapView};
pub use pricing::PricingSummary;
pub use store::{DevicePatch, DeviceStore};
pub use submission::{ErrorKind, SubmissionCoordinator, SubmitError};
pub use valuation::valuation;
pub use wizard::{ReadinessIssue, Wizard, WizardSession};
