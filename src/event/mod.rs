use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

mod sse;

pub use sse::{SseDecoder, SseFrame};

/// Resource type tag as used by the bridge (`"light"`, `"grouped_light"`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Light,
    Device,
    Room,
    Zone,
    GroupedLight,
    Scene,
    ZigbeeConnectivity,
    BridgeHome,
    /// Any resource type this crate does not model
    #[serde(other)]
    Unknown,
}

impl ResourceKind {
    /// Path segment under `/resource/`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Light => "light",
            ResourceKind::Device => "device",
            ResourceKind::Room => "room",
            ResourceKind::Zone => "zone",
            ResourceKind::GroupedLight => "grouped_light",
            ResourceKind::Scene => "scene",
            ResourceKind::ZigbeeConnectivity => "zigbee_connectivity",
            ResourceKind::BridgeHome => "bridge_home",
            ResourceKind::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        serde_json::from_value(Value::String(value.to_string())).unwrap_or(ResourceKind::Unknown)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Update,
    Add,
    Delete,
    Error,
}

/// A single resource change pushed by the bridge.
///
/// `attributes` holds only the fields that changed (for `Update`) or the full
/// resource body (for `Add`). Applying the same event twice is harmless: every
/// attribute is an overwrite.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceEvent {
    /// SSE frame id the event arrived in (used as `Last-Event-ID` on reconnect)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,

    pub change: ChangeKind,

    pub kind: ResourceKind,

    /// Resource UUID
    pub id: String,

    /// Partial attribute update (never contains `id` / `type`)
    pub attributes: Map<String, Value>,

    /// Local receive time
    pub received_at: DateTime<Utc>,
}

impl ResourceEvent {
    /// Build an update event (mostly for tests and local echoes).
    pub fn update(kind: ResourceKind, id: impl Into<String>, attributes: Value) -> Self {
        let attributes = match attributes {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            stream_id: None,
            change: ChangeKind::Update,
            kind,
            id: id.into(),
            attributes,
            received_at: Utc::now(),
        }
    }
}

/// One container inside an SSE `data:` array.
#[derive(Debug, Deserialize)]
struct EventContainer {
    #[serde(rename = "type")]
    change: ChangeKind,
    #[serde(default)]
    data: Vec<Value>,
}

/// Decode the JSON payload of one SSE frame into resource events.
///
/// Malformed containers or items are skipped with a warning; the bridge may
/// add container fields or resource types at any time.
pub fn parse_frame(frame: &SseFrame) -> Vec<ResourceEvent> {
    let containers: Vec<Value> = match serde_json::from_str(&frame.data) {
        Ok(Value::Array(items)) => items,
        Ok(other) => vec![other],
        Err(e) => {
            warn!(error = %e, "Event stream frame is not JSON, skipping");
            return Vec::new();
        }
    };

    let received_at = Utc::now();
    let mut events = Vec::new();

    for raw in containers {
        let container: EventContainer = match serde_json::from_value(raw) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Unrecognised event container, skipping");
                continue;
            }
        };

        if container.change == ChangeKind::Error {
            warn!(items = container.data.len(), "Bridge reported an event stream error");
            continue;
        }

        for item in container.data {
            let Value::Object(mut attributes) = item else {
                continue;
            };
            let id = match attributes.remove("id") {
                Some(Value::String(id)) => id,
                _ => {
                    warn!("Event item without id, skipping");
                    continue;
                }
            };
            let kind = match attributes.remove("type") {
                Some(Value::String(kind)) => ResourceKind::parse(&kind),
                _ => ResourceKind::Unknown,
            };

            events.push(ResourceEvent {
                stream_id: frame.id.clone(),
                change: container.change,
                kind,
                id,
                attributes,
                received_at,
            });
        }
    }

    events
}
