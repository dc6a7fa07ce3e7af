use super::*;
use crate::interpreter::Interpreter;
use crate::rate_limit::{RateGovernor, RateLimitConfig};
use crate::state::fixtures::loaded_cache;
use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::json;

const OK_BODY: &str = r#"{"errors": [], "data": []}"#;

fn executor(server: &Server) -> CommandExecutor {
    let governor = Arc::new(RateGovernor::new(RateLimitConfig {
        device_per_second: 1000.0,
        device_burst: 100,
        group_per_second: 1000.0,
        group_burst: 100,
    }));
    let client = BridgeClient::with_base_url(server.url(), "test-key", governor).unwrap();
    CommandExecutor::new(
        Arc::new(loaded_cache()),
        Resolver::default(),
        Arc::new(client),
        ExecutorConfig::default(),
    )
}

fn intent(text: &str) -> Intent {
    Interpreter::default().parse(text).unwrap()
}

/// Any light PUT; must not be hit.
async fn no_light_requests(server: &mut ServerGuard) -> Mock {
    server
        .mock(
            "PUT",
            Matcher::Regex(r"^/clip/v2/resource/light/".to_string()),
        )
        .with_status(200)
        .with_body(OK_BODY)
        .expect(0)
        .create_async()
        .await
}

#[tokio::test]
async fn test_room_target_issues_one_grouped_request() {
    let mut server = Server::new_async().await;
    let grouped = server
        .mock("PUT", "/clip/v2/resource/grouped_light/gl-kitchen")
        .match_body(Matcher::Json(json!({
            "on": {"on": true},
            "dimming": {"brightness": 50.0},
            "dynamics": {"duration": 400}
        })))
        .with_status(200)
        .with_body(OK_BODY)
        .expect(1)
        .create_async()
        .await;
    let lights = no_light_requests(&mut server).await;

    let report = executor(&server)
        .execute(&intent("dim kitchen to 50%"))
        .await
        .unwrap();

    grouped.assert_async().await;
    lights.assert_async().await;
    assert_eq!(report.status, ExecutionStatus::Success);
    assert_eq!(report.target_name, "Kitchen");
    assert_eq!(report.affected, vec!["Kitchen Ceiling", "Kitchen Counter"]);
    assert_eq!(report.outcomes.len(), 1);
}

#[tokio::test]
async fn test_hex_color_reaches_grouped_light_with_xy() {
    let mut server = Server::new_async().await;
    let grouped = server
        .mock("PUT", "/clip/v2/resource/grouped_light/gl-bed")
        .match_body(Matcher::PartialJson(json!({
            "on": {"on": true},
            "dynamics": {"duration": 400}
        })))
        .with_status(200)
        .with_body(OK_BODY)
        .expect(1)
        .create_async()
        .await;

    let report = executor(&server)
        .execute(&intent("set bedroom to #FF5500"))
        .await
        .unwrap();

    grouped.assert_async().await;
    assert_eq!(report.status, ExecutionStatus::Success);
    // Bedside Lamp has a connectivity issue
    assert_eq!(report.unreachable, vec!["Bedside Lamp"]);
    assert!(report.message.contains("unreachable"));
}

#[tokio::test]
async fn test_explicit_transition_overrides_default() {
    let mut server = Server::new_async().await;
    let grouped = server
        .mock("PUT", "/clip/v2/resource/grouped_light/gl-living")
        .match_body(Matcher::Json(json!({
            "on": {"on": true},
            "dynamics": {"duration": 5000}
        })))
        .with_status(200)
        .with_body(OK_BODY)
        .create_async()
        .await;

    executor(&server)
        .execute(&intent("turn on living room in 5 seconds"))
        .await
        .unwrap();

    grouped.assert_async().await;
}

#[tokio::test]
async fn test_group_without_grouped_light_falls_back_to_lights() {
    let mut server = Server::new_async().await;
    let light = server
        .mock("PUT", "/clip/v2/resource/light/light-o1")
        .match_body(Matcher::PartialJson(json!({"on": {"on": false}})))
        .with_status(200)
        .with_body(OK_BODY)
        .expect(1)
        .create_async()
        .await;

    let report = executor(&server)
        .execute(&intent("turn off office"))
        .await
        .unwrap();

    light.assert_async().await;
    assert_eq!(report.status, ExecutionStatus::Success);
    assert_eq!(report.affected, vec!["Desk Lamp"]);
}

#[tokio::test]
async fn test_per_light_failure_is_partial() {
    let mut server = Server::new_async().await;
    let mut mocks = Vec::new();
    for id in ["light-k1", "light-l1", "light-l2", "light-b1", "light-o1"] {
        mocks.push(
            server
                .mock("PUT", format!("/clip/v2/resource/light/{}", id).as_str())
                .with_status(200)
                .with_body(OK_BODY)
                .expect(1)
                .create_async()
                .await,
        );
    }
    mocks.push(
        server
            .mock("PUT", "/clip/v2/resource/light/light-k2")
            .with_status(500)
            .with_body(r#"{"errors": [{"description": "internal error"}], "data": []}"#)
            .expect(1)
            .create_async()
            .await,
    );

    let report = executor(&server)
        .execute(&intent("turn off everything"))
        .await
        .unwrap();

    for mock in &mocks {
        mock.assert_async().await;
    }
    assert_eq!(report.status, ExecutionStatus::Partial);
    assert_eq!(report.failed(), vec!["Kitchen Counter"]);
    assert_eq!(report.affected.len(), 5);
    assert!(report.message.contains("failed for: Kitchen Counter"));
}

#[tokio::test]
async fn test_ambiguous_target_sends_nothing() {
    let mut server = Server::new_async().await;
    let lights = no_light_requests(&mut server).await;

    let err = executor(&server)
        .execute(&intent("turn on lamp"))
        .await
        .unwrap_err();

    lights.assert_async().await;
    match err {
        CommandError::Ambiguous { candidates, .. } => assert!(candidates.len() > 1),
        other => panic!("expected ambiguity, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_target_lists_available_names() {
    let server = Server::new_async().await;
    let err = executor(&server)
        .execute(&intent("turn on garage"))
        .await
        .unwrap_err();

    assert!(matches!(err, CommandError::NotFound { .. }));
    assert!(err.to_string().contains("Kitchen"));
}

#[tokio::test]
async fn test_scene_recall_uses_target_room() {
    let mut server = Server::new_async().await;
    let scene = server
        .mock("PUT", "/clip/v2/resource/scene/scene-relax-bed")
        .match_body(Matcher::Json(json!({"recall": {"action": "active"}})))
        .with_status(200)
        .with_body(OK_BODY)
        .expect(1)
        .create_async()
        .await;

    let report = executor(&server)
        .execute(&intent("relax mode in bedroom"))
        .await
        .unwrap();

    scene.assert_async().await;
    assert_eq!(report.status, ExecutionStatus::Success);
    assert_eq!(report.message, "Activated scene 'Relax' in Bedroom (unreachable: Bedside Lamp)");
}

#[tokio::test]
async fn test_missing_scene_is_an_error() {
    let server = Server::new_async().await;
    let err = executor(&server)
        .execute(&intent("sunset scene in living room"))
        .await
        .unwrap_err();

    match err {
        CommandError::SceneNotFound { available, .. } => {
            assert_eq!(available, vec!["Energize".to_string(), "Relax".to_string()])
        }
        other => panic!("expected missing scene, got {:?}", other),
    }
}

#[tokio::test]
async fn test_scene_keyword_prefers_scene_then_temperature() {
    let mut server = Server::new_async().await;
    let scene = server
        .mock("PUT", "/clip/v2/resource/scene/scene-concentrate-office")
        .with_status(200)
        .with_body(OK_BODY)
        .expect(1)
        .create_async()
        .await;
    let grouped = server
        .mock("PUT", "/clip/v2/resource/grouped_light/gl-kitchen")
        .match_body(Matcher::PartialJson(json!({
            "color_temperature": {"mirek": 370}
        })))
        .with_status(200)
        .with_body(OK_BODY)
        .expect(1)
        .create_async()
        .await;

    let executor = executor(&server);
    executor
        .execute(&intent("set office to concentrate"))
        .await
        .unwrap();
    // The kitchen has no Relax scene, so the keyword becomes 2700K
    executor
        .execute(&intent("set kitchen to relax"))
        .await
        .unwrap();

    scene.assert_async().await;
    grouped.assert_async().await;
}

#[tokio::test]
async fn test_effects_go_to_each_light() {
    let mut server = Server::new_async().await;
    let mut mocks = Vec::new();
    for id in ["light-k1", "light-k2"] {
        mocks.push(
            server
                .mock("PUT", format!("/clip/v2/resource/light/{}", id).as_str())
                .match_body(Matcher::Json(json!({
                    "on": {"on": true},
                    "effects": {"effect": "candle"}
                })))
                .with_status(200)
                .with_body(OK_BODY)
                .expect(1)
                .create_async()
                .await,
        );
    }
    let grouped = server
        .mock("PUT", "/clip/v2/resource/grouped_light/gl-kitchen")
        .expect(0)
        .create_async()
        .await;

    let report = executor(&server)
        .execute(&intent("candle effect in kitchen"))
        .await
        .unwrap();

    for mock in &mocks {
        mock.assert_async().await;
    }
    grouped.assert_async().await;
    assert_eq!(report.outcomes.len(), 2);
}

#[tokio::test]
async fn test_auth_failure_is_reported() {
    let mut server = Server::new_async().await;
    server
        .mock("PUT", "/clip/v2/resource/light/light-o1")
        .with_status(403)
        .with_body(r#"{"errors": [{"description": "unauthorized user"}]}"#)
        .create_async()
        .await;

    let report = executor(&server)
        .execute(&intent("turn on desk lamp"))
        .await
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Failure);
    assert!(report.has_auth_failure());
    assert!(report.affected.is_empty());
}

#[tokio::test]
async fn test_introspection_is_not_dispatched() {
    let server = Server::new_async().await;
    let err = executor(&server)
        .execute(&intent("status"))
        .await
        .unwrap_err();
    assert_eq!(err, CommandError::NotDispatchable { verb: "status" });
}

#[test]
fn test_unserializable_body_is_an_error() {
    use std::collections::HashMap;

    // JSON object keys must be strings
    let body: HashMap<(u8, u8), u8> = [((1, 2), 3)].into_iter().collect();
    match encode_body(&body) {
        Err(CommandError::Payload { reason }) => assert!(!reason.is_empty()),
        other => panic!("expected payload error, got {:?}", other),
    }
    assert!(encode_body(&RecallPayload::active(None)).is_ok());
}
