//! ============================================================================
//! Swap Service API - HTTP client and the seams the engine talks through
//! ============================================================================
//! Endpoints (relative to the configured base URL):
//! - POST swap/create      create a swap request (bearer token)
//! - GET  swap/my          list the caller's swap requests (bearer token)
//! - GET  products/?limit  candidate target devices
//!
//! Non-success bodies are kept as JSON so callers can surface the server's
//! own message. 401 and 403 are reported as `ApiError::Unauthorized`.
//! ============================================================================

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog::TargetDevice;
use crate::config::SwapConfig;
use crate::submission::CreateSwapRequest;
use crate::types::{SwapId, SwapRequest, SwapStatus};

/// Error returned by the swap service client
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Not authorized")]
    Unauthorized { body: Value },

    #[error("Swap service error {status}")]
    Server { status: u16, body: Value },

    #[error("Unexpected response from swap service: {0}")]
    Decode(String),
}

impl ApiError {
    /// Human-readable message carried in the error body, if any
    pub fn server_message(&self) -> Option<String> {
        match self {
            ApiError::Unauthorized { body } | ApiError::Server { body, .. } => {
                extract_error_message(body)
            }
            _ => None,
        }
    }
}

/// Pull a displayable message out of an error body.
///
/// Looks at `detail`, `error`, `message`, a bare string body, then an
/// `errors` map rendered one `field: msg, msg` line per entry.
pub fn extract_error_message(body: &Value) -> Option<String> {
    if let Value::Object(map) = body {
        for key in ["detail", "error", "message"] {
            if let Some(text) = map.get(key).and_then(value_text) {
                return Some(text);
            }
        }
    }

    if let Value::String(text) = body {
        let text = text.trim();
        if !text.is_empty() {
            return Some(text.to_string());
        }
    }

    let errors = body.get("errors")?.as_object()?;
    let lines: Vec<String> = errors
        .iter()
        .map(|(field, value)| match value {
            Value::Array(items) => {
                let items: Vec<String> = items.iter().filter_map(value_text).collect();
                format!("{}: {}", field, items.join(", "))
            }
            other => format!("{}: {}", field, value_text(other).unwrap_or_default()),
        })
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(false) => None,
        other => Some(other.to_string()),
    }
}

/// Reply to a create request
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedSwap {
    pub id: SwapId,
    #[serde(default)]
    pub status: Option<SwapStatus>,
}

/// Swap request endpoints
#[async_trait]
pub trait SwapApi: Send + Sync {
    async fn create_swap(
        &self,
        token: &str,
        request: &CreateSwapRequest,
    ) -> Result<CreatedSwap, ApiError>;

    async fn list_my_swaps(&self, token: &str) -> Result<Vec<SwapRequest>, ApiError>;
}

/// Target device catalog
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn list_target_devices(&self, limit: usize) -> Result<Vec<TargetDevice>, ApiError>;
}

/// Supplies the session's bearer token, if the user is signed in
pub trait TokenProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed token, or none
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }
}

/// Reads the token from the environment on every call
#[derive(Debug, Clone)]
pub struct EnvTokenProvider {
    vars: Vec<String>,
}

impl EnvTokenProvider {
    /// `TRADEIN_ACCESS_TOKEN`, falling back to `TRADEIN_TOKEN`
    pub fn new() -> Self {
        Self::with_vars(&["TRADEIN_ACCESS_TOKEN", "TRADEIN_TOKEN"])
    }

    /// First non-blank variable in `vars` wins
    pub fn with_vars(vars: &[&str]) -> Self {
        Self {
            vars: vars.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl Default for EnvTokenProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenProvider for EnvTokenProvider {
    fn bearer_token(&self) -> Option<String> {
        self.vars
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .map(|token| token.trim().to_string())
            .find(|token| !token.is_empty())
    }
}

/// List endpoints answer with either a page object or a bare array
#[derive(Deserialize)]
#[serde(untagged)]
enum ListResponse<T> {
    Paged { results: Vec<T> },
    Bare(Vec<T>),
}

impl<T> ListResponse<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            ListResponse::Paged { results } => results,
            ListResponse::Bare(items) => items,
        }
    }
}

/// reqwest-backed client for the swap service
pub struct HttpSwapClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSwapClient {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tradein/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &SwapConfig) -> Self {
        Self::new(&config.api_base_url)
    }

    fn url(&self, path: &str) -> String {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!("Swap service request: {}", url);
        url
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body = serde_json::from_str::<Value>(&text).unwrap_or_else(|_| {
                if text.trim().is_empty() {
                    Value::Null
                } else {
                    Value::String(text)
                }
            });
            warn!("Swap service returned {}: {}", status, body);

            return Err(match status.as_u16() {
                401 | 403 => ApiError::Unauthorized { body },
                code => ApiError::Server { status: code, body },
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl SwapApi for HttpSwapClient {
    async fn create_swap(
        &self,
        token: &str,
        request: &CreateSwapRequest,
    ) -> Result<CreatedSwap, ApiError> {
        info!(
            "Creating swap request for target {} ({} device(s))",
            request.target_device_id,
            request.user_device.number_of_devices
        );

        let created: CreatedSwap = self
            .send_json(
                self.client
                    .post(self.url("swap/create"))
                    .bearer_auth(token)
                    .json(request),
            )
            .await?;

        info!("Created swap request {}", created.id);
        Ok(created)
    }

    async fn list_my_swaps(&self, token: &str) -> Result<Vec<SwapRequest>, ApiError> {
        let swaps: ListResponse<SwapRequest> = self
            .send_json(self.client.get(self.url("swap/my")).bearer_auth(token))
            .await?;

        let swaps = swaps.into_items();
        debug!("Fetched {} swap request(s)", swaps.len());
        Ok(swaps)
    }
}

#[async_trait]
impl CatalogApi for HttpSwapClient {
    async fn list_target_devices(&self, limit: usize) -> Result<Vec<TargetDevice>, ApiError> {
        let devices: ListResponse<TargetDevice> = self
            .send_json(
                self.client
                    .get(self.url("products/"))
                    .query(&[("limit", limit)]),
            )
            .await?;

        let devices = devices.into_items();
        debug!("Fetched {} catalog item(s)", devices.len());
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_detail_first() {
        let body = json!({ "detail": "Token expired", "error": "other" });
        assert_eq!(extract_error_message(&body), Some("Token expired".into()));
    }

    #[test]
    fn test_extract_error_then_message() {
        assert_eq!(
            extract_error_message(&json!({ "error": "Target device unavailable" })),
            Some("Target device unavailable".into())
        );
        assert_eq!(
            extract_error_message(&json!({ "detail": "", "message": "Try later" })),
            Some("Try later".into())
        );
    }

    #[test]
    fn test_extract_string_body() {
        assert_eq!(
            extract_error_message(&json!("Bad Gateway")),
            Some("Bad Gateway".into())
        );
        assert_eq!(extract_error_message(&json!("   ")), None);
    }

    #[test]
    fn test_extract_errors_map() {
        let body = json!({
            "errors": {
                "email": ["Enter a valid email address.", "Required."],
                "targetDeviceId": "Unknown product"
            }
        });
        assert_eq!(
            extract_error_message(&body),
            Some(
                "email: Enter a valid email address., Required.\ntargetDeviceId: Unknown product"
                    .into()
            )
        );
    }

    #[test]
    fn test_extract_nothing_useful() {
        assert_eq!(extract_error_message(&Value::Null), None);
        assert_eq!(extract_error_message(&json!({ "status": 500 })), None);
        assert_eq!(extract_error_message(&json!({ "errors": {} })), None);
    }

    #[test]
    fn test_server_message() {
        let err = ApiError::Server {
            status: 400,
            body: json!({ "detail": "Invalid target" }),
        };
        assert_eq!(err.server_message(), Some("Invalid target".into()));
        assert_eq!(ApiError::Transport("reset".into()).server_message(), None);
    }

    #[test]
    fn test_static_token_blank_is_absent() {
        assert_eq!(StaticToken(None).bearer_token(), None);
        assert_eq!(StaticToken(Some("  ".into())).bearer_token(), None);
        assert_eq!(
            StaticToken(Some(" abc ".into())).bearer_token(),
            Some("abc".into())
        );
    }

    #[test]
    fn test_env_token_fallback() {
        std::env::set_var("TRADEIN_TEST_PRIMARY_TOKEN", "");
        std::env::set_var("TRADEIN_TEST_FALLBACK_TOKEN", "fallback");
        let provider =
            EnvTokenProvider::with_vars(&["TRADEIN_TEST_PRIMARY_TOKEN", "TRADEIN_TEST_FALLBACK_TOKEN"]);
        assert_eq!(provider.bearer_token(), Some("fallback".into()));

        std::env::set_var("TRADEIN_TEST_PRIMARY_TOKEN", "primary");
        assert_eq!(provider.bearer_token(), Some("primary".into()));

        let missing = EnvTokenProvider::with_vars(&["TRADEIN_TEST_UNSET_TOKEN"]);
        assert_eq!(missing.bearer_token(), None);
    }

    #[test]
    fn test_list_response_shapes() {
        let paged: ListResponse<u32> = serde_json::from_value(json!({ "results": [1, 2] })).unwrap();
        assert_eq!(paged.into_items(), vec![1, 2]);

        let bare: ListResponse<u32> = serde_json::from_value(json!([3])).unwrap();
        assert_eq!(bare.into_items(), vec![3]);
    }

    #[test]
    fn test_created_swap_without_status() {
        let created: CreatedSwap = serde_json::from_value(json!({ "id": 17 })).unwrap();
        assert_eq!(created.id, SwapId::Number(17));
        assert_eq!(created.status, None);
    }

    #[test]
    fn test_url_joining() {
        let client = HttpSwapClient::new("http://localhost:8000/api/");
        assert_eq!(client.url("swap/create"), "http://localhost:8000/api/swap/create");
        assert_eq!(client.url("/swap/my"), "http://localhost:8000/api/swap/my");
    }
}
