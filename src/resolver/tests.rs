use super::score::edit_similarity;
use super::*;
use crate::event::{ChangeKind, ResourceEvent};
use crate::state::fixtures::loaded_cache;
use serde_json::json;

fn resolver() -> Resolver {
    Resolver::default()
}

fn unique_name(resolution: Resolution) -> String {
    match resolution {
        Resolution::Unique(target) => target.name().to_string(),
        other => panic!("expected unique match, got {:?}", other),
    }
}

#[test]
fn test_normalize() {
    assert_eq!(normalize("  Living   Room! "), "living room");
    assert_eq!(normalize("Kid's Room"), "kids room");
    assert_eq!(normalize("kitchen-ceiling_2"), "kitchen ceiling 2");
    assert_eq!(normalize(" \t "), "");
}

#[test]
fn test_exact_names_resolve_uniquely() {
    let cache = loaded_cache();
    let arena = cache.snapshot();
    let resolver = resolver();

    for entry in arena.name_index().entries() {
        match resolver.resolve(&arena, &entry.name.text) {
            Resolution::Unique(target) => assert_eq!(target, entry.target),
            other => panic!("{} did not resolve: {:?}", entry.name.text, other),
        }
    }
}

#[test]
fn test_exact_match_ignores_case_and_punctuation() {
    let cache = loaded_cache();
    let arena = cache.snapshot();
    assert_eq!(unique_name(resolver().resolve(&arena, "LIVING-ROOM")), "Living Room");
    assert_eq!(unique_name(resolver().resolve(&arena, "livingroom")), "Living Room");
}

#[test]
fn test_empty_phrase_is_not_found() {
    let cache = loaded_cache();
    let arena = cache.snapshot();

    for phrase in ["", "   ", "\t\n"] {
        match resolver().resolve(&arena, phrase) {
            Resolution::NotFound { available, .. } => {
                assert!(available.contains(&"Kitchen".to_string()));
            }
            other => panic!("expected not found, got {:?}", other),
        }
    }
}

#[test]
fn test_nonsense_is_not_found() {
    let cache = loaded_cache();
    let arena = cache.snapshot();
    assert!(matches!(
        resolver().resolve(&arena, "zzqx"),
        Resolution::NotFound { .. }
    ));
}

#[test]
fn test_prefix_and_typo_matches() {
    let cache = loaded_cache();
    let arena = cache.snapshot();
    let resolver = resolver();

    assert_eq!(unique_name(resolver.resolve(&arena, "office")), "Office");
    assert_eq!(unique_name(resolver.resolve(&arena, "bedrom")), "Bedroom");
    assert_eq!(unique_name(resolver.resolve(&arena, "downstair")), "Downstairs");
}

#[test]
fn test_close_candidates_are_ambiguous() {
    let cache = loaded_cache();
    let arena = cache.snapshot();

    // Four lamps share the token equally
    match resolver().resolve(&arena, "lamp") {
        Resolution::Ambiguous { candidates, .. } => {
            assert_eq!(candidates.len(), 4);
            assert!(candidates.windows(2).all(|w| w[0].score >= w[1].score));
        }
        other => panic!("expected ambiguity, got {:?}", other),
    }
}

#[test]
fn test_room_wins_exact_tie_with_light() {
    let cache = loaded_cache();
    cache.apply(&ResourceEvent::update(
        ResourceKind::Light,
        "light-o1",
        json!({"metadata": {"name": "Office"}}),
    ));
    let arena = cache.snapshot();

    match resolver().resolve(&arena, "office") {
        Resolution::Unique(Target::Room { id, .. }) => assert_eq!(id, "room-office"),
        other => panic!("expected the room, got {:?}", other),
    }
}

#[test]
fn test_two_lights_with_same_name_are_ambiguous() {
    let cache = loaded_cache();
    let mut add = ResourceEvent::update(
        ResourceKind::Light,
        "light-x",
        json!({"metadata": {"name": "Desk Lamp"}, "on": {"on": false}}),
    );
    add.change = ChangeKind::Add;
    cache.apply(&add);

    match resolver().resolve(&cache.snapshot(), "desk lamp") {
        Resolution::Ambiguous { candidates, .. } => assert_eq!(candidates.len(), 2),
        other => panic!("expected ambiguity, got {:?}", other),
    }
}

#[test]
fn test_all_lights_phrases() {
    let cache = loaded_cache();
    let arena = cache.snapshot();
    for phrase in ["all", "All Lights", "everything", "the house"] {
        assert_eq!(
            resolver().resolve(&arena, phrase),
            Resolution::Unique(Target::AllLights)
        );
    }
}

#[test]
fn test_candidates_are_sorted_and_truncated() {
    let cache = loaded_cache();
    let arena = cache.snapshot();
    let resolver = Resolver::new(ResolverConfig {
        top_k: 2,
        ..ResolverConfig::default()
    });

    let candidates = resolver.candidates(arena.name_index(), "lamp");
    assert_eq!(candidates.len(), 2);
    assert!(candidates[0].score >= candidates[1].score);
}

#[test]
fn test_resolve_scene_within_group() {
    let cache = loaded_cache();
    let arena = cache.snapshot();
    let resolver = resolver();

    match resolver.resolve_scene(&arena, "relax", Some("room-bed")) {
        SceneMatch::Unique(scene) => assert_eq!(scene.id, "scene-relax-bed"),
        other => panic!("expected scene, got {:?}", other),
    }

    // Two scenes called "Relax" across the house
    assert!(matches!(
        resolver.resolve_scene(&arena, "relax", None),
        SceneMatch::Ambiguous(_)
    ));

    match resolver.resolve_scene(&arena, "sunset", Some("room-living")) {
        SceneMatch::NotFound { available } => {
            assert_eq!(available, vec!["Energize".to_string(), "Relax".to_string()])
        }
        other => panic!("expected not found, got {:?}", other),
    }
}

#[test]
fn test_edit_similarity() {
    assert_eq!(edit_similarity("kitchen", "kitchen"), 1.0);
    assert!(edit_similarity("kitchn", "kitchen") > 0.8);
    assert!(edit_similarity("garage", "kitchen") < 0.5);
}
