// Bridge transport: CLIP v2 requests and the event stream subscription

mod error;
mod events;

pub use error::TransportError;
pub use events::{EventSubscription, StreamMessage};

use crate::event::ResourceKind;
use crate::rate_limit::{RateGovernor, RequestCategory};
use error::check_status;
use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the application key on every request.
pub(crate) const APPLICATION_KEY_HEADER: &str = "hue-application-key";

/// Path prefix of the resource API.
const API_PREFIX: &str = "/clip/v2";

/// Bridge connection settings.
#[derive(Clone, Debug, Deserialize)]
pub struct BridgeConfig {
    /// Bridge IP or hostname
    #[serde(default)]
    pub host: String,

    /// Application key obtained by pairing (never logged)
    #[serde(default)]
    pub application_key: String,

    /// Full base URL override (`https://<host>` when unset)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request deadline, including the wait for a rate limit token
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// The bridge serves a self-issued certificate
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_accept_invalid_certs() -> bool {
    true
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            application_key: String::new(),
            base_url: None,
            request_timeout_ms: default_request_timeout_ms(),
            accept_invalid_certs: default_accept_invalid_certs(),
        }
    }
}

impl BridgeConfig {
    /// Resolved base URL without trailing slash.
    pub fn base_url(&self) -> String {
        match &self.base_url {
            Some(url) if !url.is_empty() => url.trim_end_matches('/').to_string(),
            _ => format!("https://{}", self.host),
        }
    }
}

/// Event stream reconnect settings.
#[derive(Clone, Debug, Deserialize)]
pub struct EventStreamConfig {
    #[serde(default = "default_events_enabled")]
    pub enabled: bool,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Buffered messages between the stream task and its consumer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_events_enabled() -> bool {
    true
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for EventStreamConfig {
    fn default() -> Self {
        Self {
            enabled: default_events_enabled(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Resource listing envelope: `{"errors": [...], "data": [...]}`.
#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default)]
    data: Vec<Value>,
}

/// HTTP client for the bridge's CLIP v2 API.
///
/// Every request first takes a token from the shared [`RateGovernor`] for
/// its category; the wait counts against the per-request timeout.
pub struct BridgeClient {
    http: Client,
    base_url: String,
    application_key: String,
    governor: Arc<RateGovernor>,
    request_timeout: Duration,
    events: EventStreamConfig,
}

impl BridgeClient {
    /// Build a client for the configured bridge.
    pub fn new(
        config: &BridgeConfig,
        events: EventStreamConfig,
        governor: Arc<RateGovernor>,
    ) -> Result<Self, TransportError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .connect_timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| TransportError::Setup {
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            application_key: config.application_key.clone(),
            governor,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            events,
        })
    }

    /// Create a client against a custom base URL (for testing with a mock server).
    pub fn with_base_url(
        base_url: impl Into<String>,
        application_key: impl Into<String>,
        governor: Arc<RateGovernor>,
    ) -> Result<Self, TransportError> {
        let config = BridgeConfig {
            base_url: Some(base_url.into()),
            application_key: application_key.into(),
            ..BridgeConfig::default()
        };
        Self::new(&config, EventStreamConfig::default(), governor)
    }

    /// Replace the event stream settings (builder style).
    pub fn with_event_config(mut self, events: EventStreamConfig) -> Self {
        self.events = events;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn governor(&self) -> &Arc<RateGovernor> {
        &self.governor
    }

    /// Issue one request under `/clip/v2`.
    ///
    /// `path` starts with `/` (e.g. `/resource/light/<id>`). Returns the
    /// parsed JSON body (`Value::Null` for an empty body).
    pub async fn request(
        &self,
        category: RequestCategory,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        self.governor
            .acquire_within(category, self.request_timeout)
            .await
            .map_err(|e| TransportError::Transient {
                reason: e.to_string(),
            })?;

        let url = format!("{}{}{}", self.base_url, API_PREFIX, path);
        debug!(method = %method, path = %path, category = %category, "Bridge request");

        let mut builder = self
            .http
            .request(method, &url)
            .header(APPLICATION_KEY_HEADER, &self.application_key)
            .timeout(self.request_timeout);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(TransportError::from_reqwest)?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let text = response.text().await.map_err(TransportError::from_reqwest)?;
        let parsed = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => value,
                Err(_) if !status.is_success() => Value::Null,
                Err(e) => {
                    return Err(TransportError::Decode {
                        reason: e.to_string(),
                    })
                }
            }
        };

        if let Err(e) = check_status(status, path, retry_after, &parsed) {
            warn!(path = %path, status = status.as_u16(), error = %e, "Bridge request failed");
            return Err(e);
        }

        Ok(parsed)
    }

    pub async fn get(&self, category: RequestCategory, path: &str) -> Result<Value, TransportError> {
        self.request(category, Method::GET, path, None).await
    }

    pub async fn put(
        &self,
        category: RequestCategory,
        path: &str,
        body: &Value,
    ) -> Result<Value, TransportError> {
        self.request(category, Method::PUT, path, Some(body)).await
    }

    /// PUT an attribute update to `/resource/<kind>/<id>`.
    pub async fn put_resource(
        &self,
        category: RequestCategory,
        kind: ResourceKind,
        id: &str,
        body: &Value,
    ) -> Result<Value, TransportError> {
        let path = format!("/resource/{}/{}", kind.as_str(), id);
        self.put(category, &path, body).await
    }

    /// Fetch every resource of one kind.
    ///
    /// Items that fail to deserialize are skipped with a warning so one odd
    /// resource cannot break a full sync.
    pub async fn get_resources<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
    ) -> Result<Vec<T>, TransportError> {
        let path = format!("/resource/{}", kind.as_str());
        let body = self.get(RequestCategory::Device, &path).await?;
        let listing: Listing = serde_json::from_value(body).map_err(|e| TransportError::Decode {
            reason: format!("{} listing: {}", kind, e),
        })?;

        let mut items = Vec::with_capacity(listing.data.len());
        for raw in listing.data {
            match serde_json::from_value::<T>(raw) {
                Ok(item) => items.push(item),
                Err(e) => warn!(kind = %kind, error = %e, "Skipping malformed resource"),
            }
        }
        Ok(items)
    }
}
