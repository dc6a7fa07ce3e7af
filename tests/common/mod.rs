// Shared fixtures for integration tests: a mockito bridge serving a small home
#![allow(dead_code)]

use huectl::config::HueConfig;
use huectl::rate_limit::RateLimitConfig;
use mockito::{Mock, Server, ServerGuard};
use serde_json::{json, Value};

pub const OK_BODY: &str = r#"{"errors": [], "data": []}"#;

fn light(id: &str, name: &str, on: bool, brightness: f64) -> Value {
    json!({
        "id": id,
        "type": "light",
        "owner": {"rid": format!("dev-{}", id), "rtype": "device"},
        "metadata": {"name": name},
        "on": {"on": on},
        "dimming": {"brightness": brightness},
        "color_temperature": {"mirek": 370, "mirek_valid": true}
    })
}

fn device(light_id: &str, name: &str) -> Value {
    json!({
        "id": format!("dev-{}", light_id),
        "type": "device",
        "metadata": {"name": name},
        "services": [{"rid": light_id, "rtype": "light"}]
    })
}

/// Two rooms (Kitchen with a grouped light, Study without), one scene.
pub fn home() -> Vec<(&'static str, Value)> {
    vec![
        (
            "light",
            json!([
                light("k1", "Kitchen Ceiling", true, 80.0),
                light("k2", "Kitchen Counter", false, 0.0),
                light("s1", "Study Lamp", true, 50.0)
            ]),
        ),
        (
            "device",
            json!([
                device("k1", "Kitchen Ceiling"),
                device("k2", "Kitchen Counter"),
                device("s1", "Study Lamp")
            ]),
        ),
        (
            "room",
            json!([
                {
                    "id": "room-kitchen",
                    "type": "room",
                    "metadata": {"name": "Kitchen"},
                    "children": [
                        {"rid": "dev-k1", "rtype": "device"},
                        {"rid": "dev-k2", "rtype": "device"}
                    ],
                    "services": [{"rid": "gl-kitchen", "rtype": "grouped_light"}]
                },
                {
                    "id": "room-study",
                    "type": "room",
                    "metadata": {"name": "Study"},
                    "children": [{"rid": "dev-s1", "rtype": "device"}],
                    "services": []
                }
            ]),
        ),
        ("zone", json!([])),
        (
            "grouped_light",
            json!([{
                "id": "gl-kitchen",
                "type": "grouped_light",
                "owner": {"rid": "room-kitchen", "rtype": "room"},
                "on": {"on": true}
            }]),
        ),
        (
            "scene",
            json!([{
                "id": "scene-read-study",
                "type": "scene",
                "metadata": {"name": "Read"},
                "group": {"rid": "room-study", "rtype": "room"},
                "actions": [],
                "status": {"active": "inactive"}
            }]),
        ),
        ("zigbee_connectivity", json!([])),
    ]
}

/// Register a listing mock for every resource kind, each expected `hits` times.
pub async fn serve_home(server: &mut ServerGuard, hits: usize) -> Vec<Mock> {
    let mut mocks = Vec::new();
    for (kind, data) in home() {
        mocks.push(
            server
                .mock("GET", format!("/clip/v2/resource/{}", kind).as_str())
                .match_header("hue-application-key", "test-key")
                .with_status(200)
                .with_header("content-type", "application/json")
                .with_body(json!({"errors": [], "data": data}).to_string())
                .expect(hits)
                .create_async()
                .await,
        );
    }
    mocks
}

/// A bridge that serves the test home for one sync.
pub async fn bridge() -> (ServerGuard, Vec<Mock>) {
    let mut server = Server::new_async().await;
    let listings = serve_home(&mut server, 1).await;
    (server, listings)
}

/// Configuration pointing at the mock bridge, with generous rate limits and
/// no event stream.
pub fn config(server: &ServerGuard) -> HueConfig {
    let mut config = HueConfig::default();
    config.bridge.base_url = Some(server.url());
    config.bridge.application_key = "test-key".to_string();
    config.bridge.request_timeout_ms = 2000;
    config.rate_limit = RateLimitConfig {
        device_per_second: 1000.0,
        device_burst: 100,
        group_per_second: 1000.0,
        group_burst: 100,
    };
    config.events.enabled = false;
    config
}
