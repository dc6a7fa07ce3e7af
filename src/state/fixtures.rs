// Shared in-crate test home: four rooms, one zone, six lights

use super::{Listing, StateCache};
use serde_json::{json, Value};

fn light(id: &str, name: &str, device: &str, on: bool, brightness: f64) -> Value {
    json!({
        "id": id,
        "type": "light",
        "owner": {"rid": device, "rtype": "device"},
        "metadata": {"name": name, "archetype": "sultan_bulb"},
        "on": {"on": on},
        "dimming": {"brightness": brightness, "min_dim_level": 0.2},
        "color": {"xy": {"x": 0.4573, "y": 0.41}, "gamut_type": "C"},
        "color_temperature": {"mirek": null, "mirek_valid": false},
        "effects": {"effect_values": ["no_effect", "candle", "fire"], "status": "no_effect"}
    })
}

fn device(id: &str, name: &str, light: &str) -> Value {
    json!({
        "id": id,
        "type": "device",
        "metadata": {"name": name},
        "services": [
            {"rid": light, "rtype": "light"},
            {"rid": format!("zc-{}", id), "rtype": "zigbee_connectivity"}
        ]
    })
}

fn room(id: &str, name: &str, devices: &[&str], grouped: Option<&str>) -> Value {
    let children: Vec<Value> = devices
        .iter()
        .map(|d| json!({"rid": d, "rtype": "device"}))
        .collect();
    let services: Vec<Value> = grouped
        .map(|g| vec![json!({"rid": g, "rtype": "grouped_light"})])
        .unwrap_or_default();
    json!({"id": id, "type": "room", "metadata": {"name": name}, "children": children, "services": services})
}

fn grouped(id: &str, owner: &str, owner_kind: &str, on: bool) -> Value {
    json!({
        "id": id,
        "type": "grouped_light",
        "owner": {"rid": owner, "rtype": owner_kind},
        "on": {"on": on},
        "dimming": {"brightness": 60.0}
    })
}

fn scene(id: &str, name: &str, group: &str) -> Value {
    json!({
        "id": id,
        "type": "scene",
        "metadata": {"name": name},
        "group": {"rid": group, "rtype": "room"},
        "actions": [],
        "speed": 0.5,
        "auto_dynamic": false,
        "status": {"active": "inactive"}
    })
}

pub(crate) fn listing_json() -> Value {
    json!({
        "lights": [
            light("light-k1", "Kitchen Ceiling", "dev-k1", true, 80.0),
            light("light-k2", "Kitchen Counter", "dev-k2", false, 0.0),
            light("light-l1", "Floor Lamp", "dev-l1", true, 45.0),
            light("light-l2", "Reading Lamp", "dev-l2", false, 30.0),
            light("light-b1", "Bedside Lamp", "dev-b1", false, 10.0),
            light("light-o1", "Desk Lamp", "dev-o1", true, 100.0)
        ],
        "devices": [
            device("dev-k1", "Kitchen Ceiling", "light-k1"),
            device("dev-k2", "Kitchen Counter", "light-k2"),
            device("dev-l1", "Floor Lamp", "light-l1"),
            device("dev-l2", "Reading Lamp", "light-l2"),
            device("dev-b1", "Bedside Lamp", "light-b1"),
            device("dev-o1", "Desk Lamp", "light-o1")
        ],
        "rooms": [
            room("room-kitchen", "Kitchen", &["dev-k1", "dev-k2"], Some("gl-kitchen")),
            room("room-living", "Living Room", &["dev-l1", "dev-l2"], Some("gl-living")),
            room("room-bed", "Bedroom", &["dev-b1"], Some("gl-bed")),
            room("room-office", "Office", &["dev-o1"], None)
        ],
        "zones": [{
            "id": "zone-down",
            "type": "zone",
            "metadata": {"name": "Downstairs"},
            "children": [
                {"rid": "light-k1", "rtype": "light"},
                {"rid": "light-l1", "rtype": "light"}
            ],
            "services": [{"rid": "gl-down", "rtype": "grouped_light"}]
        }],
        "grouped_lights": [
            grouped("gl-kitchen", "room-kitchen", "room", true),
            grouped("gl-living", "room-living", "room", true),
            grouped("gl-bed", "room-bed", "room", false),
            grouped("gl-down", "zone-down", "zone", true)
        ],
        "scenes": [
            scene("scene-relax-living", "Relax", "room-living"),
            scene("scene-energize-living", "Energize", "room-living"),
            scene("scene-relax-bed", "Relax", "room-bed"),
            scene("scene-night-bed", "Nightlight", "room-bed"),
            scene("scene-concentrate-office", "Concentrate", "room-office")
        ],
        "zigbee_connectivity": [
            {"id": "zc-dev-k1", "type": "zigbee_connectivity", "owner": {"rid": "dev-k1", "rtype": "device"}, "status": "connected"},
            {"id": "zc-dev-b1", "type": "zigbee_connectivity", "owner": {"rid": "dev-b1", "rtype": "device"}, "status": "connectivity_issue"}
        ]
    })
}

pub(crate) fn listing() -> Listing {
    serde_json::from_value(listing_json()).unwrap()
}

/// Cache loaded with the test home.
pub(crate) fn loaded_cache() -> StateCache {
    let cache = StateCache::new();
    cache.load(listing());
    cache
}
