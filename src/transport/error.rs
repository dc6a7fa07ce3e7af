use reqwest::StatusCode;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Failure talking to the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Application key missing, expired or revoked (401/403)
    Auth { status: u16 },
    /// Unknown resource id or path (404)
    NotFound { path: String },
    /// Bridge-side rate limit (429)
    RateLimited { retry_after: Option<Duration> },
    /// Any other non-2xx answer
    Api { status: u16, description: String },
    /// Timeout, refused connection, DNS failure, dropped stream
    Transient { reason: String },
    /// Response body did not have the expected shape
    Decode { reason: String },
    /// HTTP client could not be constructed
    Setup { reason: String },
}

impl TransportError {
    /// True if repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::RateLimited { .. } | TransportError::Transient { .. }
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, TransportError::Auth { .. })
    }

    pub(crate) fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return TransportError::Decode {
                reason: error.to_string(),
            };
        }
        let reason = if error.is_timeout() {
            "request timed out".to_string()
        } else if error.is_connect() {
            format!("connection failed: {}", error)
        } else {
            error.to_string()
        };
        TransportError::Transient { reason }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Auth { status } => write!(
                f,
                "bridge rejected the application key (HTTP {}); pair again to get a new one",
                status
            ),
            TransportError::NotFound { path } => write!(f, "resource not found: {}", path),
            TransportError::RateLimited { retry_after } => match retry_after {
                Some(wait) => write!(f, "bridge rate limit hit, retry after {}s", wait.as_secs()),
                None => write!(f, "bridge rate limit hit"),
            },
            TransportError::Api {
                status,
                description,
            } => write!(f, "bridge error (HTTP {}): {}", status, description),
            TransportError::Transient { reason } => write!(f, "bridge unreachable: {}", reason),
            TransportError::Decode { reason } => write!(f, "unexpected bridge response: {}", reason),
            TransportError::Setup { reason } => write!(f, "HTTP client setup failed: {}", reason),
        }
    }
}

impl std::error::Error for TransportError {}

/// Map a non-2xx status to a typed error.
///
/// - 401 / 403 → auth failure
/// - 404 → not found
/// - 429 → rate limited (with `Retry-After` seconds if present)
/// - other non-2xx → API error carrying the bridge's first error description
pub(crate) fn check_status(
    status: StatusCode,
    path: &str,
    retry_after: Option<Duration>,
    body: &Value,
) -> Result<(), TransportError> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TransportError::Auth {
            status: status.as_u16(),
        }),
        StatusCode::NOT_FOUND => Err(TransportError::NotFound {
            path: path.to_string(),
        }),
        StatusCode::TOO_MANY_REQUESTS => Err(TransportError::RateLimited { retry_after }),
        s if !s.is_success() => Err(TransportError::Api {
            status: s.as_u16(),
            description: first_error_description(body)
                .unwrap_or_else(|| s.canonical_reason().unwrap_or("unknown").to_string()),
        }),
        _ => Ok(()),
    }
}

/// `{"errors": [{"description": "..."}]}` → first description.
pub(crate) fn first_error_description(body: &Value) -> Option<String> {
    body.get("errors")?
        .as_array()?
        .iter()
        .find_map(|e| e.get("description").and_then(|d| d.as_str()))
        .map(str::to_string)
}
