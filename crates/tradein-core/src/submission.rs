//! ============================================================================
//! Submission Coordinator - Turns a ready session into a swap request
//! ============================================================================
//! Submit flow:
//! 1. Claim the in-flight flag (a second submit while one is pending fails)
//! 2. Validate the session and build the request payload
//! 3. Require a bearer token before any network activity
//! 4. Call create-swap exactly once, bounded by the submit timeout
//! 5. Map failures to a message the user can act on
//!
//! The payload carries the first device as `userDevice`, with the full list
//! in `userDevice.allDevices` and its length in `userDevice.numberOfDevices`.
//! ============================================================================

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::api::{ApiError, SwapApi, TokenProvider};
use crate::config::SwapConfig;
use crate::types::{DeviceRecord, SwapId};
use crate::wizard::{ReadinessIssue, WizardSession};

/// Shown when the server gives no usable message
pub const GENERIC_SUBMIT_ERROR: &str = "Unable to submit swap. Please try again.";

/// One device as sent to the swap service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePayload {
    pub category: String,
    pub brand: String,
    pub model: String,
    pub storage: String,
    pub ram: String,
    pub condition: String,
    pub issues: Vec<String>,
    /// Percentage as text, empty when unknown
    pub battery_health: String,
    pub images: Vec<String>,
}

impl From<&DeviceRecord> for DevicePayload {
    fn from(device: &DeviceRecord) -> Self {
        Self {
            category: device.category.clone(),
            brand: device.brand.clone(),
            model: device.model.clone(),
            storage: device.storage.clone(),
            ram: device.ram.clone(),
            condition: device.condition.clone(),
            issues: device.issues.clone(),
            battery_health: device
                .battery_health
                .map(|h| h.to_string())
                .unwrap_or_default(),
            images: device.images.clone(),
        }
    }
}

/// The primary device plus the rest of the session's data
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryDevicePayload {
    #[serde(flatten)]
    pub device: DevicePayload,
    pub number_of_devices: usize,
    pub all_devices: Vec<DevicePayload>,
    pub full_name: String,
    pub phone_number: String,
}

/// Body of the create-swap call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSwapRequest {
    pub user_device: PrimaryDevicePayload,
    pub email: String,
    pub estimated_value: f64,
    pub target_device_id: String,
    pub target_device_price: f64,
    pub difference: f64,
}

impl CreateSwapRequest {
    /// Build the payload, or report the first reason the session is not ready
    pub fn from_session(session: &WizardSession) -> Result<Self, ReadinessIssue> {
        if let Some(issue) = session.submit_blockers().into_iter().next() {
            return Err(issue);
        }

        let (Some(primary), Some(target)) = (session.devices().first(), session.target()) else {
            return Err(ReadinessIssue::NoTargetDevice);
        };

        let contact = session.contact();
        let all_devices: Vec<DevicePayload> =
            session.devices().iter().map(DevicePayload::from).collect();

        Ok(Self {
            user_device: PrimaryDevicePayload {
                device: DevicePayload::from(primary),
                number_of_devices: all_devices.len(),
                all_devices,
                full_name: contact.full_name.trim().to_string(),
                phone_number: contact.phone_number.trim().to_string(),
            },
            email: contact.email.trim().to_string(),
            estimated_value: session.total_estimated_value(),
            target_device_id: target.id.clone(),
            target_device_price: target.price,
            difference: session.amount_owed(),
        })
    }
}

/// Broad class of a submission failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fix something locally and try again
    Validation,
    /// The call failed or the server refused it
    Transport,
    /// The user has to log in
    Authorization,
}

/// Why a submission did not produce a swap request
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmitError {
    #[error("{0}")]
    NotReady(ReadinessIssue),

    #[error("A submission is already in progress.")]
    AlreadySubmitting,

    #[error("Please log in or create an account to submit your swap.")]
    NotAuthenticated,

    #[error("{0}")]
    Rejected(String),

    #[error("Unable to reach the swap service. Please try again.")]
    Transport,

    #[error("The swap service did not respond in time. Please try again.")]
    TimedOut,
}

impl SubmitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmitError::NotReady(_) | SubmitError::AlreadySubmitting => ErrorKind::Validation,
            SubmitError::NotAuthenticated => ErrorKind::Authorization,
            SubmitError::Rejected(_) | SubmitError::Transport | SubmitError::TimedOut => {
                ErrorKind::Transport
            }
        }
    }
}

impl From<ApiError> for SubmitError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized { .. } => SubmitError::NotAuthenticated,
            ApiError::Server { .. } => SubmitError::Rejected(
                err.server_message()
                    .unwrap_or_else(|| GENERIC_SUBMIT_ERROR.to_string()),
            ),
            ApiError::Transport(_) | ApiError::Decode(_) => SubmitError::Transport,
        }
    }
}

/// Clears the in-flight flag when the submit attempt ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Submits sessions, one at a time
pub struct SubmissionCoordinator {
    api: Arc<dyn SwapApi>,
    tokens: Arc<dyn TokenProvider>,
    timeout: Duration,
    in_flight: AtomicBool,
}

impl SubmissionCoordinator {
    pub fn new(api: Arc<dyn SwapApi>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            api,
            tokens,
            timeout: Duration::from_secs(SwapConfig::default().submit_timeout_secs),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Create a swap request from `session`. Never retried.
    pub async fn submit(&self, session: &WizardSession) -> Result<SwapId, SubmitError> {
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or_else(|| {
            warn!("Ignoring submit while another submission is in flight");
            SubmitError::AlreadySubmitting
        })?;

        let request = CreateSwapRequest::from_session(session).map_err(SubmitError::NotReady)?;

        let token = self
            .tokens
            .bearer_token()
            .ok_or(SubmitError::NotAuthenticated)?;

        info!(
            "Submitting swap: {} device(s), estimate {:.2}, target {}",
            request.user_device.number_of_devices,
            request.estimated_value,
            request.target_device_id
        );

        match tokio::time::timeout(self.timeout, self.api.create_swap(&token, &request)).await {
            Ok(Ok(created)) => {
                info!("Swap request {} submitted", created.id);
                Ok(created.id)
            }
            Ok(Err(e)) => {
                warn!("Swap submission failed: {:?}", e);
                Err(SubmitError::from(e))
            }
            Err(_) => {
                warn!("Swap submission timed out after {:?}", self.timeout);
                Err(SubmitError::TimedOut)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CreatedSwap, StaticToken};
    use crate::store::DevicePatch;
    use crate::types::{Contact, SwapRequest, TargetSelection, WizardStep};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    enum Behavior {
        Reply(Result<CreatedSwap, ApiError>),
        WaitFor(Arc<Notify>),
        Hang,
    }

    struct FakeSwapApi {
        behavior: Behavior,
        calls: AtomicUsize,
        last_request: Mutex<Option<CreateSwapRequest>>,
    }

    impl FakeSwapApi {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn replying(reply: Result<CreatedSwap, ApiError>) -> Arc<Self> {
            Self::new(Behavior::Reply(reply))
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn created(id: u64) -> CreatedSwap {
        CreatedSwap {
            id: SwapId::Number(id),
            status: None,
        }
    }

    #[async_trait]
    impl SwapApi for FakeSwapApi {
        async fn create_swap(
            &self,
            _token: &str,
            request: &CreateSwapRequest,
        ) -> Result<CreatedSwap, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            match &self.behavior {
                Behavior::Reply(reply) => reply.clone(),
                Behavior::WaitFor(gate) => {
                    gate.notified().await;
                    Ok(created(1))
                }
                Behavior::Hang => std::future::pending().await,
            }
        }

        async fn list_my_swaps(&self, _token: &str) -> Result<Vec<SwapRequest>, ApiError> {
            Ok(vec![])
        }
    }

    fn token() -> Arc<StaticToken> {
        Arc::new(StaticToken(Some("access".into())))
    }

    fn ready_session(device_count: usize) -> WizardSession {
        let mut session = WizardSession::new().with_device_count(device_count).go_next();
        let ids: Vec<String> = session.devices().iter().map(|d| d.id.clone()).collect();
        for id in ids {
            session = session.with_device_update(
                &id,
                DevicePatch {
                    category: Some("Smartphones".into()),
                    brand: Some("Apple".into()),
                    model: Some("X".into()),
                    storage: Some("256GB".into()),
                    ram: Some("8GB".into()),
                    condition: Some("Good".into()),
                    battery_health: Some(Some(90.0)),
                    ..DevicePatch::default()
                },
            );
        }
        session
            .go_next()
            .with_contact(Contact {
                email: " jane@example.com ".into(),
                full_name: "Jane Doe".into(),
                phone_number: "+1 555 0100".into(),
            })
            .with_target(TargetSelection {
                id: "12".into(),
                price: 500.0,
            })
    }

    #[test]
    fn test_payload_shape() {
        let request = CreateSwapRequest::from_session(&ready_session(2)).unwrap();
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["email"], json!("jane@example.com"));
        assert_eq!(body["estimatedValue"], json!(320.0));
        assert_eq!(body["targetDeviceId"], json!("12"));
        assert_eq!(body["targetDevicePrice"], json!(500.0));
        assert_eq!(body["difference"], json!(180.0));

        let device = &body["userDevice"];
        assert_eq!(device["brand"], json!("Apple"));
        assert_eq!(device["batteryHealth"], json!("90"));
        assert_eq!(device["numberOfDevices"], json!(2));
        assert_eq!(device["allDevices"].as_array().unwrap().len(), 2);
        assert_eq!(device["fullName"], json!("Jane Doe"));
        assert_eq!(device["phoneNumber"], json!("+1 555 0100"));
    }

    #[test]
    fn test_unknown_battery_sent_as_empty_string() {
        let mut record = DeviceRecord::blank();
        record.battery_health = None;
        assert_eq!(DevicePayload::from(&record).battery_health, "");
        record.battery_health = Some(87.5);
        assert_eq!(DevicePayload::from(&record).battery_health, "87.5");
    }

    #[test]
    fn test_payload_requires_ready_session() {
        let session = ready_session(1).with_contact(Contact::default());
        assert_eq!(
            CreateSwapRequest::from_session(&session),
            Err(ReadinessIssue::InvalidEmail)
        );
    }

    #[tokio::test]
    async fn test_submit_returns_server_id() {
        let api = FakeSwapApi::replying(Ok(created(42)));
        let coordinator = SubmissionCoordinator::new(api.clone(), token());

        let id = coordinator.submit(&ready_session(1)).await.unwrap();
        assert_eq!(id, SwapId::Number(42));
        assert_eq!(api.calls(), 1);
        assert!(!coordinator.is_submitting());

        let sent = api.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(sent.difference, 340.0);
    }

    #[tokio::test]
    async fn test_not_ready_makes_no_call() {
        let api = FakeSwapApi::replying(Ok(created(1)));
        let coordinator = SubmissionCoordinator::new(api.clone(), token());

        let err = coordinator.submit(&WizardSession::new()).await.unwrap_err();
        assert!(matches!(err, SubmitError::NotReady(_)));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_complete_session_off_summary_is_not_ready() {
        let api = FakeSwapApi::replying(Ok(created(1)));
        let coordinator = SubmissionCoordinator::new(api.clone(), token());

        let at_details = ready_session(1).go_back();
        assert_eq!(at_details.step(), WizardStep::Details);
        let err = coordinator.submit(&at_details).await.unwrap_err();
        assert_eq!(err, SubmitError::NotReady(ReadinessIssue::NotAtSummary));

        let at_quantity = at_details.go_back();
        assert_eq!(at_quantity.step(), WizardStep::Quantity);
        let err = coordinator.submit(&at_quantity).await.unwrap_err();
        assert_eq!(err, SubmitError::NotReady(ReadinessIssue::NotAtSummary));
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_token_makes_no_call() {
        let api = FakeSwapApi::replying(Ok(created(1)));
        let coordinator = SubmissionCoordinator::new(api.clone(), Arc::new(StaticToken(None)));

        let err = coordinator.submit(&ready_session(1)).await.unwrap_err();
        assert_eq!(err, SubmitError::NotAuthenticated);
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(api.calls(), 0);
    }

    #[tokio::test]
    async fn test_detail_is_surfaced_exactly() {
        let api = FakeSwapApi::replying(Err(ApiError::Server {
            status: 400,
            body: json!({ "detail": "Email already used" }),
        }));
        let coordinator = SubmissionCoordinator::new(api, token());

        let err = coordinator.submit(&ready_session(1)).await.unwrap_err();
        assert_eq!(err.to_string(), "Email already used");
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_server_error_without_message_is_generic() {
        let api = FakeSwapApi::replying(Err(ApiError::Server {
            status: 500,
            body: serde_json::Value::Null,
        }));
        let coordinator = SubmissionCoordinator::new(api, token());

        let err = coordinator.submit(&ready_session(1)).await.unwrap_err();
        assert_eq!(err.to_string(), GENERIC_SUBMIT_ERROR);
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_login() {
        let api = FakeSwapApi::replying(Err(ApiError::Unauthorized {
            body: json!({ "detail": "Given token not valid for any token type" }),
        }));
        let coordinator = SubmissionCoordinator::new(api, token());

        let err = coordinator.submit(&ready_session(1)).await.unwrap_err();
        assert_eq!(err, SubmitError::NotAuthenticated);
    }

    #[tokio::test]
    async fn test_transport_details_not_surfaced() {
        let api = FakeSwapApi::replying(Err(ApiError::Transport(
            "error sending request: connection refused (os error 111)".into(),
        )));
        let coordinator = SubmissionCoordinator::new(api, token());

        let err = coordinator.submit(&ready_session(1)).await.unwrap_err();
        assert_eq!(err, SubmitError::Transport);
        assert!(!err.to_string().contains("os error"));
    }

    #[tokio::test]
    async fn test_second_submit_rejected_while_in_flight() {
        let gate = Arc::new(Notify::new());
        let api = FakeSwapApi::new(Behavior::WaitFor(gate.clone()));
        let coordinator = SubmissionCoordinator::new(api.clone(), token());
        let session = ready_session(1);

        let (first, second, _) = tokio::join!(
            coordinator.submit(&session),
            async {
                assert!(coordinator.is_submitting());
                coordinator.submit(&session).await
            },
            async {
                tokio::task::yield_now().await;
                gate.notify_one();
            }
        );

        assert_eq!(first, Ok(SwapId::Number(1)));
        assert_eq!(second, Err(SubmitError::AlreadySubmitting));
        assert_eq!(api.calls(), 1);
        assert!(!coordinator.is_submitting());
    }

    #[tokio::test]
    async fn test_hung_call_times_out_and_clears_flag() {
        let api = FakeSwapApi::new(Behavior::Hang);
        let coordinator =
            SubmissionCoordinator::new(api, token()).with_timeout(Duration::from_millis(50));

        let err = coordinator.submit(&ready_session(1)).await.unwrap_err();
        assert_eq!(err, SubmitError::TimedOut);
        assert!(!coordinator.is_submitting());
    }
}
