use super::fixtures::{listing, listing_json, loaded_cache};
use super::*;
use crate::event::{ChangeKind, ResourceEvent, ResourceKind};
use crate::resolver::Target;
use crate::transport::StreamMessage;
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn event(change: ChangeKind, kind: ResourceKind, id: &str, attributes: Value) -> ResourceEvent {
    let mut event = ResourceEvent::update(kind, id, attributes);
    event.change = change;
    event
}

fn brightness_of(cache: &StateCache, id: &str) -> Option<f64> {
    cache.snapshot().light(id).and_then(|l| l.brightness)
}

#[test]
fn test_load_builds_typed_arena() {
    let cache = loaded_cache();
    let arena = cache.snapshot();

    assert_eq!(arena.generation(), 1);
    assert_eq!(arena.lights().len(), 6);
    assert_eq!(arena.rooms().len(), 4);
    assert_eq!(arena.zones().len(), 1);
    assert_eq!(arena.scenes().len(), 5);

    let ceiling = arena.light("light-k1").unwrap();
    assert_eq!(ceiling.name, "Kitchen Ceiling");
    assert!(ceiling.on);
    assert_eq!(ceiling.brightness, Some(80.0));
    assert!(matches!(ceiling.color, Some(LightColor::Xy(_))));
    assert!(ceiling.supports_color);
    assert_eq!(ceiling.effects.len(), 3);
}

#[test]
fn test_update_for_unknown_id_is_noop() {
    let cache = loaded_cache();
    let before = cache.snapshot();

    let outcome = cache.apply(&ResourceEvent::update(
        ResourceKind::Light,
        "does-not-exist",
        json!({"dimming": {"brightness": 10.0}}),
    ));

    assert_eq!(outcome, ApplyOutcome::Ignored);
    let after = cache.snapshot();
    assert_eq!(after.generation(), before.generation());
    assert_eq!(after.len(), before.len());
    assert_eq!(cache.metrics().snapshot().events_ignored, 1);
}

#[test]
fn test_last_write_wins_per_attribute() {
    let cache = loaded_cache();

    cache.apply(&ResourceEvent::update(
        ResourceKind::Light,
        "light-l1",
        json!({"dimming": {"brightness": 50.0}}),
    ));
    cache.apply(&ResourceEvent::update(
        ResourceKind::Light,
        "light-l1",
        json!({"dimming": {"brightness": 70.0}}),
    ));

    assert_eq!(brightness_of(&cache, "light-l1"), Some(70.0));
    // Untouched attributes survive the partial update
    assert!(cache.snapshot().light("light-l1").unwrap().on);
}

#[test]
fn test_replayed_event_is_idempotent() {
    let cache = loaded_cache();
    let update = ResourceEvent::update(
        ResourceKind::Light,
        "light-k2",
        json!({"on": {"on": true}, "dimming": {"brightness": 33.0}}),
    );

    cache.apply(&update);
    let once = cache.snapshot().light("light-k2").cloned().unwrap();
    cache.apply(&update);
    let twice = cache.snapshot().light("light-k2").cloned().unwrap();

    assert_eq!(once.on, twice.on);
    assert_eq!(once.brightness, twice.brightness);
}

#[test]
fn test_unknown_attributes_are_ignored() {
    let cache = loaded_cache();
    let outcome = cache.apply(&ResourceEvent::update(
        ResourceKind::Light,
        "light-k1",
        json!({"powerup": {"preset": "safety"}, "on": {"on": false}}),
    ));

    assert_eq!(outcome, ApplyOutcome::Updated(vec!["on".to_string()]));
    assert!(!cache.snapshot().light("light-k1").unwrap().on);
}

#[test]
fn test_kind_mismatch_is_ignored() {
    let cache = loaded_cache();
    let outcome = cache.apply(&ResourceEvent::update(
        ResourceKind::GroupedLight,
        "light-k1",
        json!({"on": {"on": false}}),
    ));
    assert_eq!(outcome, ApplyOutcome::Ignored);
    assert!(cache.snapshot().light("light-k1").unwrap().on);
}

#[test]
fn test_load_replaces_previous_contents() {
    let cache = loaded_cache();
    assert!(cache.snapshot().light("light-o1").is_some());

    let mut json = listing_json();
    let lights = json["lights"].as_array_mut().unwrap();
    lights.retain(|l| l["id"] != "light-o1");
    cache.load(serde_json::from_value(json).unwrap());

    let arena = cache.snapshot();
    assert!(arena.light("light-o1").is_none());
    assert_eq!(arena.lights().len(), 5);
    assert_eq!(arena.generation(), 2);
}

#[test]
fn test_snapshot_is_stable_across_writes() {
    let cache = loaded_cache();
    let snapshot = cache.snapshot();

    cache.apply(&ResourceEvent::update(
        ResourceKind::Light,
        "light-o1",
        json!({"dimming": {"brightness": 5.0}}),
    ));

    assert_eq!(snapshot.light("light-o1").unwrap().brightness, Some(100.0));
    assert_eq!(brightness_of(&cache, "light-o1"), Some(5.0));
}

#[test]
fn test_rename_patches_name_index() {
    let cache = loaded_cache();
    cache.apply(&ResourceEvent::update(
        ResourceKind::Room,
        "room-office",
        json!({"metadata": {"name": "Study", "archetype": "office"}}),
    ));

    let names = cache.snapshot().name_index().names();
    assert!(names.contains(&"Study".to_string()));
    assert!(!names.contains(&"Office".to_string()));
}

#[test]
fn test_grouped_light_on_is_copied_verbatim() {
    let cache = loaded_cache();

    // Every kitchen light off locally, but the bridge still says the group is on
    cache.apply(&ResourceEvent::update(
        ResourceKind::Light,
        "light-k1",
        json!({"on": {"on": false}}),
    ));
    assert_eq!(
        cache.snapshot().grouped_light_for("room-kitchen").unwrap().on,
        Some(true)
    );

    cache.apply(&ResourceEvent::update(
        ResourceKind::GroupedLight,
        "gl-kitchen",
        json!({"on": {"on": false}}),
    ));
    assert_eq!(
        cache.snapshot().grouped_light_for("room-kitchen").unwrap().on,
        Some(false)
    );
}

#[test]
fn test_reachability_follows_zigbee_connectivity() {
    let cache = loaded_cache();
    let arena = cache.snapshot();
    assert!(!arena.light("light-b1").unwrap().reachable);
    assert!(arena.light("light-k1").unwrap().reachable);
    // No connectivity record at all
    assert!(arena.light("light-o1").unwrap().reachable);

    cache.apply(&ResourceEvent::update(
        ResourceKind::ZigbeeConnectivity,
        "zc-dev-b1",
        json!({"status": "connected"}),
    ));
    assert!(cache.snapshot().light("light-b1").unwrap().reachable);
}

#[test]
fn test_add_and_delete_events() {
    let cache = loaded_cache();

    let outcome = cache.apply(&event(
        ChangeKind::Add,
        ResourceKind::Zone,
        "zone-up",
        json!({
            "metadata": {"name": "Upstairs"},
            "children": [{"rid": "light-b1", "rtype": "light"}],
            "services": []
        }),
    ));
    assert_eq!(outcome, ApplyOutcome::Added);
    assert!(cache.snapshot().zone("zone-up").is_some());
    assert!(cache
        .snapshot()
        .name_index()
        .names()
        .contains(&"Upstairs".to_string()));

    let outcome = cache.apply(&event(
        ChangeKind::Delete,
        ResourceKind::Zone,
        "zone-up",
        Value::Object(Map::new()),
    ));
    assert_eq!(outcome, ApplyOutcome::Removed);
    assert!(cache.snapshot().zone("zone-up").is_none());
}

#[test]
fn test_device_claimed_by_two_rooms_stays_in_first() {
    let mut json = listing_json();
    json["rooms"].as_array_mut().unwrap().push(json!({
        "id": "room-zz-duplicate",
        "metadata": {"name": "Pantry"},
        "children": [{"rid": "dev-k1", "rtype": "device"}],
        "services": []
    }));

    let cache = StateCache::new();
    cache.load(serde_json::from_value(json).unwrap());
    let arena = cache.snapshot();

    assert!(arena.room("room-zz-duplicate").unwrap().children.is_empty());
    assert_eq!(arena.room("room-kitchen").unwrap().children.len(), 2);
}

#[test]
fn test_device_moving_between_rooms_follows_latest_update() {
    let cache = loaded_cache();

    // The bridge announces the new room before the old one lets go
    cache.apply(&ResourceEvent::update(
        ResourceKind::Room,
        "room-office",
        json!({"children": [
            {"rid": "dev-o1", "rtype": "device"},
            {"rid": "dev-k1", "rtype": "device"}
        ]}),
    ));
    cache.apply(&ResourceEvent::update(
        ResourceKind::Room,
        "room-kitchen",
        json!({"children": [{"rid": "dev-k2", "rtype": "device"}]}),
    ));

    let arena = cache.snapshot();
    let office: Vec<_> = arena
        .room("room-office")
        .unwrap()
        .children
        .iter()
        .map(|c| c.rid.as_str())
        .collect();
    assert_eq!(office, vec!["dev-o1", "dev-k1"]);
    assert_eq!(arena.room("room-kitchen").unwrap().children.len(), 1);
    assert_eq!(arena.room_of_light("light-k1").unwrap().id, "room-office");
}

#[test]
fn test_lights_for_targets() {
    let cache = loaded_cache();
    let arena = cache.snapshot();

    let room = Target::Room {
        id: "room-kitchen".to_string(),
        name: "Kitchen".to_string(),
    };
    let names: Vec<_> = arena.lights_for(&room).iter().map(|l| l.name.clone()).collect();
    assert_eq!(names, vec!["Kitchen Ceiling", "Kitchen Counter"]);

    let zone = Target::Zone {
        id: "zone-down".to_string(),
        name: "Downstairs".to_string(),
    };
    assert_eq!(arena.lights_for(&zone).len(), 2);
    assert_eq!(arena.lights_for(&Target::AllLights).len(), 6);
    assert_eq!(arena.room_of_light("light-l2").unwrap().name, "Living Room");
}

#[test]
fn test_changes_are_broadcast() {
    let cache = StateCache::new();
    let mut rx = cache.subscribe();

    cache.load(listing());
    assert!(matches!(
        rx.try_recv(),
        Ok(CacheChange::Synced { generation: 1, .. })
    ));

    cache.apply(&ResourceEvent::update(
        ResourceKind::Light,
        "light-k1",
        json!({"dimming": {"brightness": 12.0}}),
    ));
    match rx.try_recv() {
        Ok(CacheChange::Resource {
            resource,
            attributes,
            generation,
            ..
        }) => {
            assert_eq!(resource.rid, "light-k1");
            assert_eq!(attributes, vec!["dimming".to_string()]);
            assert_eq!(generation, 2);
        }
        other => panic!("unexpected change: {:?}", other),
    }
}

#[tokio::test]
async fn test_run_subscriber_applies_stream_in_order() {
    let cache = Arc::new(loaded_cache());
    let messages = vec![
        StreamMessage::Connected,
        StreamMessage::Event(ResourceEvent::update(
            ResourceKind::Light,
            "light-l2",
            json!({"dimming": {"brightness": 20.0}}),
        )),
        StreamMessage::Disconnected {
            reason: "reset".to_string(),
        },
        StreamMessage::Connected,
        StreamMessage::Event(ResourceEvent::update(
            ResourceKind::Light,
            "light-l2",
            json!({"dimming": {"brightness": 90.0}}),
        )),
    ];

    Arc::clone(&cache)
        .run_subscriber(futures::stream::iter(messages))
        .await;

    assert_eq!(brightness_of(&cache, "light-l2"), Some(90.0));
    let metrics = cache.metrics().snapshot();
    assert_eq!(metrics.events_applied, 2);
    assert_eq!(metrics.reconnects, 1);
    assert!(!metrics.stream_connected);
}
